use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};

use jimconv::{
    config::{default_settings_path, load_settings, save_settings, Settings},
    convert::{export_native_to_sprite, reimport_raster, sprite_to_native, ExportMode},
    native::{parse_native, parse_native_strict, serialize_native_with, NativeDocument},
    png_io::{read_png, write_png},
    render::{render_rgba, PaletteSelector},
    sprite::parse_sprite_document,
};

#[derive(Parser, Debug)]
#[command(version, about = "Convert between JIM tile maps and indexed sprite documents")]
struct Args {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Reject JIM files whose header offsets overlap
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    Map,
    Tileset,
}

impl From<ModeArg> for ExportMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Map => ExportMode::Map,
            ModeArg::Tileset => ExportMode::Tileset,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert sprite documents (glob pattern) into JIM files
    Import {
        pattern: String,
        #[arg(long)]
        no_dedup: bool,
        /// Directory for the output files (defaults to next to each input)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Re-quantize a PNG against the palettes of an existing JIM file
    Reimport {
        jim: PathBuf,
        png: PathBuf,
        /// Output path (defaults to overwriting the JIM file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Export a JIM file as a sprite document
    Export {
        jim: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Palette bank to export (0-3), or -1 for all 64 colors
        #[arg(long, allow_hyphen_values = true, value_parser = clap::value_parser!(i8).range(-1..=3))]
        palette: Option<i8>,
        /// Keep color 0 of each bank opaque
        #[arg(long)]
        opaque: bool,
    },
    /// Render the map of a JIM file to PNG
    Render {
        jim: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print a summary of a JIM file
    Info { jim: PathBuf },
    /// Show the active settings
    Config {
        /// Write the active settings to the settings file
        #[arg(long)]
        save: bool,
    },
}

fn load_native(path: &Path, strict: bool) -> Result<NativeDocument> {
    info!("Loading {}", path.display());
    let bytes = std::fs::read(path)?;
    let doc = if strict {
        parse_native_strict(&bytes)
    } else {
        parse_native(&bytes)
    };
    doc.with_context(|| format!("invalid JIM file {}", path.display()))
}

fn save_native(path: &Path, doc: &NativeDocument, settings: &Settings) -> Result<()> {
    let bytes = serialize_native_with(doc, settings.tile_index_overflow)?;
    info!("Saving {}", path.display());
    std::fs::write(path, bytes)?;
    Ok(())
}

fn import(
    pattern: &str,
    deduplicate: bool,
    out_dir: Option<&Path>,
    settings: &Settings,
) -> Result<()> {
    let mut count = 0;
    for entry in glob::glob(pattern)? {
        let path = entry?;
        let bytes = std::fs::read(&path)?;
        let sprite = parse_sprite_document(&bytes)
            .with_context(|| format!("invalid sprite document {}", path.display()))?;
        let doc = sprite_to_native(&sprite, deduplicate)?;
        let mut file_name = path
            .file_stem()
            .context("input path has no file name")?
            .to_os_string();
        file_name.push(".jim");
        let dir = match out_dir {
            Some(dir) => dir.to_owned(),
            None => path.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        let out_path = dir.join(file_name);
        save_native(&out_path, &doc, settings)?;
        count += 1;
    }
    if count == 0 {
        bail!("no files match {pattern}");
    }
    info!("Imported {count} file(s)");
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let config_path = match args.config {
        Some(p) => p,
        None => default_settings_path()?,
    };
    let settings = load_settings(&config_path)?;

    match args.command {
        Command::Import {
            pattern,
            no_dedup,
            out_dir,
        } => import(
            &pattern,
            settings.deduplicate && !no_dedup,
            out_dir.as_deref(),
            &settings,
        )?,
        Command::Reimport { jim, png, output } => {
            let existing = load_native(&jim, args.strict)?;
            let image = read_png(&png)?;
            let doc = reimport_raster(&existing, &image.pixels, image.width, image.height)?;
            save_native(output.as_deref().unwrap_or(&jim), &doc, &settings)?;
        }
        Command::Export {
            jim,
            output,
            mode,
            palette,
            opaque,
        } => {
            let doc = load_native(&jim, args.strict)?;
            let mut options = settings.export_options();
            if let Some(mode) = mode {
                options.mode = mode.into();
            }
            if let Some(idx) = palette {
                options.palette =
                    PaletteSelector::from_index(idx).context("palette must be -1..=3")?;
            }
            if opaque {
                options.transparent_on_zero = false;
            }
            let bytes = export_native_to_sprite(&doc, &options)?;
            info!("Saving {}", output.display());
            std::fs::write(&output, bytes)?;
        }
        Command::Render { jim, output } => {
            let doc = load_native(&jim, args.strict)?;
            let (width, height, rgba) = render_rgba(&doc);
            write_png(&output, width, height, &rgba)?;
        }
        Command::Info { jim } => {
            let doc = load_native(&jim, args.strict)?;
            println!("tiles: {}", doc.tiles.len());
            println!("map:   {}x{}", doc.map_width, doc.map_height);
            for (p, palette) in doc.palettes.iter().enumerate() {
                let colors: Vec<String> = palette
                    .iter()
                    .map(|c| format!("{:02X}{:02X}{:02X}", c.r, c.g, c.b))
                    .collect();
                println!("palette {p}: {}", colors.join(" "));
            }
        }
        Command::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            if save {
                save_settings(&config_path, &settings)?;
            }
        }
    }
    Ok(())
}

pub fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run(Args::parse()) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
