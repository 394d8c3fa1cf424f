use std::path::PathBuf;

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    catalog: Option<PathBuf>,
    null_audio: bool,
    help: bool,
}

fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1).collect())?;
    if args.help {
        print_help();
        return Ok(());
    }

    mrmusic::app::run_with_startup(mrmusic::app::AppStartupOptions {
        catalog_path: args.catalog,
        null_audio: args.null_audio,
    })
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--null-audio" => out.null_audio = true,
            "--catalog" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--catalog requires a path");
                };
                if value.trim().is_empty() {
                    anyhow::bail!("--catalog cannot be empty");
                }
                out.catalog = Some(PathBuf::from(value.trim()));
            }
            "-h" | "--help" => out.help = true,
            other => anyhow::bail!("unknown argument {other}"),
        }
        index += 1;
    }
    Ok(out)
}

fn print_help() {
    println!("Mr. Music");
    println!("  --catalog <path>  Load tracks from a JSON catalog");
    println!("  --null-audio      Run without an audio device");
    println!();
    println!("Keys: Up/Down move, Enter details, p play, Space pause, n/b next/prev,");
    println!("      Left/Right seek or browse details, Esc close, a add to playlist,");
    println!("      m menu, Tab switch view, e export, d download, : command, Ctrl+C quit");
    println!();
    println!("Environment: MRMUSIC_CONFIG_DIR, MRMUSIC_CATALOG, MRMUSIC_EXPORT_DIR, PREFIX_PATH");
}
