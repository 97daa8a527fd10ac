use playlog::app::AppStartupOptions;
use playlog::core::Command;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct CliArgs {
    music: Option<PathBuf>,
    fallback: Option<u32>,
    yes: bool,
    words: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1).collect())?;
    let command = parse_command(&args)?;
    playlog::app::run_with_startup(AppStartupOptions {
        music_folder: args.music,
        fallback_duration_seconds: args.fallback,
        command,
    })
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--music" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--music requires a folder");
                };
                if value.trim().is_empty() {
                    anyhow::bail!("--music cannot be empty");
                }
                out.music = Some(PathBuf::from(value.trim()));
            }
            "--fallback" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--fallback requires a number of seconds");
                };
                let seconds = value
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| anyhow::anyhow!("--fallback expects whole seconds, got {value}"))?;
                out.fallback = Some(seconds);
            }
            "--yes" => out.yes = true,
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other if other.starts_with("--") => anyhow::bail!("unknown argument {other}"),
            word => out.words.push(word.to_string()),
        }
        index += 1;
    }
    Ok(out)
}

fn parse_command(args: &CliArgs) -> anyhow::Result<Command> {
    let words: Vec<&str> = args.words.iter().map(String::as_str).collect();
    let command = match words.as_slice() {
        [] | ["stats"] => Command::Stats,
        ["list"] => Command::List,
        ["log"] => Command::Log,
        ["play", track_id] => Command::Play((*track_id).to_string()),
        ["favorite", "add", track_id] => Command::AddFavorite((*track_id).to_string()),
        ["favorite", "remove", track_id] => Command::RemoveFavorite((*track_id).to_string()),
        ["reset"] => {
            if !args.yes {
                anyhow::bail!("reset erases all play history; pass --yes to confirm");
            }
            Command::Reset
        }
        other => anyhow::bail!("unknown command: {}", other.join(" ")),
    };
    Ok(command)
}

fn print_help() {
    println!("playlog");
    println!("  list                        List tracks with durations");
    println!("  play <track>                Count a play of <track>");
    println!("  stats                       Total listening time and favorites");
    println!("  log                         Plays from the last 24 hours");
    println!("  favorite add|remove <track> Manage favorites by hand");
    println!("  reset --yes                 Erase history, favorites and total time");
    println!("  --music <dir>               Music folder (saved)");
    println!("  --fallback <secs>           Duration used when a file reports none (saved)");
}
