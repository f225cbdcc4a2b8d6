use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "hashtag-generator-rust",
    version,
    about = "Serve image-to-hashtag generation backed by Cloud Vision and Cloud Translation"
)]
struct Cli {
    /// Address to listen on (default from settings: 0.0.0.0)
    #[arg(long = "host")]
    host: Option<String>,

    /// Port to listen on (overrides PORT and settings)
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Print the effective settings and exit
    #[arg(long = "show-settings")]
    show_settings: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    hashtag_generator_rust::logging::init(cli.verbose)?;
    hashtag_generator_rust::run(hashtag_generator_rust::Config {
        host: cli.host,
        port: cli.port,
        settings_path: cli.read_settings,
        show_settings: cli.show_settings,
    })
    .await
}
