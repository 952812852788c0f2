use ::image::ImageFormat as RasterFormat;
use chrono::Local;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use wapp::pixel::{self, get_codec, read_bounded, ImageFormat, TargetSize};
use wapp::{AppMeta, DirectoryKind, WappFile};

#[derive(Parser)]
#[command(name = "wapp", about = "Create, inspect and extract .wapp smartwatch applications")]
struct Cli {
    /// Log level (trace, debug, info, warn, error); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an application from metadata and resource files
    #[command(visible_alias = "c")]
    Create {
        /// Application metadata (JSON)
        #[arg(short = 'm', long)]
        app_meta: PathBuf,
        /// Compiled script files or directories containing them
        #[arg(short = 's', long = "script", visible_alias = "scripts", num_args = 1..)]
        scripts: Vec<PathBuf>,
        /// Layout JSON files or directories (minified on the way in)
        #[arg(short = 'l', long = "layout", visible_alias = "layouts", num_args = 1..)]
        layouts: Vec<PathBuf>,
        /// Image files or directories; PNGs are RLE-encoded
        #[arg(short = 'i', long = "image", visible_alias = "images", num_args = 1..)]
        images: Vec<PathBuf>,
        /// Config JSON files or directories (minified on the way in)
        #[arg(short = 'c', long = "config", visible_alias = "configs", num_args = 1..)]
        configs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Extract every entry into a directory tree
    #[command(visible_alias = "x")]
    Extract {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Convert IMAGE entries to PNG
        #[arg(long)]
        decode_images: bool,
    },
    /// Print information about a .wapp file
    #[command(visible_alias = "i")]
    Info {
        input: PathBuf,
        /// Print the metadata as JSON
        #[arg(long)]
        json: bool,
    },
    /// Encode a PNG into the watch image format
    #[command(visible_alias = "enc")]
    Encode {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Output size: WIDTHxHEIGHT, WIDTH or xHEIGHT
        #[arg(short = 's', long)]
        resize: Option<TargetSize>,
        /// Output format: rle (default) or raw
        #[arg(short, long, default_value = "rle")]
        format: String,
    },
    /// Decode a watch image into PNG
    #[command(visible_alias = "dec")]
    Decode {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Input format: auto (default), rle or raw
        #[arg(short, long, default_value = "auto")]
        format: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match cli.command {

        // ── Create ───────────────────────────────────────────────────────────
        Commands::Create { app_meta, scripts, layouts, images, configs, output } => {
            let meta = AppMeta::from_json(&fs::read_to_string(&app_meta)?)?;
            let mut wapp = WappFile::from_meta(&meta)?;

            for path in collect_files(&scripts)? {
                wapp.add_entry(DirectoryKind::Script, &entry_name(&path)?, &fs::read(&path)?)?;
                info!("  script  {}", path.display());
            }
            for path in collect_files(&layouts)? {
                let text = minify_json(&fs::read_to_string(&path)?)?;
                wapp.add_entry(DirectoryKind::Layout, &entry_name(&path)?, text.as_bytes())?;
                info!("  layout  {}", path.display());
            }
            for path in collect_files(&images)? {
                let (name, data) = load_image(&path)?;
                wapp.add_entry(DirectoryKind::Image, &name, &data)?;
                info!("  image   {}", path.display());
            }
            for path in collect_files(&configs)? {
                let text = minify_json(&fs::read_to_string(&path)?)?;
                wapp.add_entry(DirectoryKind::Config, &entry_name(&path)?, text.as_bytes())?;
                info!("  config  {}", path.display());
            }

            fs::write(&output, wapp.to_bytes())?;
            println!("Created: {}", output.display());
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, output, decode_images } => {
            let wapp = WappFile::parse(&fs::read(&input)?)?;
            for dir in wapp.directories().filter(|d| !d.is_empty()) {
                let dir_path = output.join(dir.kind().dir_name());
                fs::create_dir_all(&dir_path)?;
                for entry in dir.entries() {
                    let entry = entry?;
                    let path = dir_path.join(safe_file_name(entry.name)?);
                    let data = entry.content.as_bytes();
                    if decode_images && dir.kind() == DirectoryKind::Image {
                        match pixel::decode_auto(data) {
                            Ok((image, _)) => {
                                image.save_with_format(path.with_extension("png"), RasterFormat::Png)?;
                                continue;
                            }
                            Err(e) => warn!("{}: {e}, writing it undecoded", entry.name),
                        }
                    }
                    fs::write(&path, data)?;
                }
            }
            println!("Extracted to: {}", output.display());
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let mut wapp = WappFile::parse(&fs::read(&input)?)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&wapp.meta())?);
            } else {
                print!("{wapp}");
            }
        }

        // ── Encode ───────────────────────────────────────────────────────────
        Commands::Encode { input, output, resize, format } => {
            let format = parse_format(&format)?;
            let image = ::image::open(&input)?;
            let data = get_codec(format).encode(&image, resize.unwrap_or_default())?;
            fs::write(&output, data)?;
            println!("Encoded ({}): {}", format.name(), output.display());
        }

        // ── Decode ───────────────────────────────────────────────────────────
        Commands::Decode { input, output, format } => {
            let data = read_bounded(File::open(&input)?)?;
            let image = match format.as_str() {
                "auto" => pixel::decode_auto(&data)?.0,
                name   => get_codec(parse_format(name)?).decode(&data)?,
            };
            image.save_with_format(&output, RasterFormat::Png)?;
            println!("Decoded: {}", output.display());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(level: Option<&str>) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

fn parse_format(s: &str) -> Result<ImageFormat, String> {
    ImageFormat::from_name(s).ok_or_else(|| format!("Unknown image format '{s}', expected rle or raw"))
}

/// Expand directories into their files, sorted by name.
fn collect_files(paths: &[PathBuf]) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(path)?
                .map(|e| e.map(|e| e.path()))
                .collect::<io::Result<_>>()?;
            found.retain(|p| p.is_file());
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn entry_name(path: &Path) -> io::Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("{} has no file name", path.display())))
}

/// Final path component of an entry name, so extraction stays inside the
/// output directory.
fn safe_file_name(name: &str) -> io::Result<&str> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("unusable entry name '{name}'")))
}

fn minify_json(text: &str) -> serde_json::Result<String> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    serde_json::to_string(&value)
}

/// PNGs are RLE-encoded and stored under their stem; anything else is
/// assumed to be encoded already.
fn load_image(path: &Path) -> Result<(String, Vec<u8>), Box<dyn std::error::Error>> {
    let is_png = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    if !is_png {
        return Ok((entry_name(path)?, fs::read(path)?));
    }
    let image = ::image::open(path)?;
    let data = pixel::rle::encode(&image, TargetSize::default())?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_owned());
    Ok((name, data))
}
