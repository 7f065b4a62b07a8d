use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "toutsurmoneau",
    about = "Water consumption reader for the toutsurmoneau.fr customer portal"
)]
struct Args {
    /// Portal username
    #[arg(short, long)]
    username: String,

    /// Portal password
    #[arg(short, long)]
    password: String,

    /// Counter (water meter) identifier
    #[arg(short, long = "counter_id")]
    counter_id: String,

    /// Portal base URL
    #[arg(long, default_value = toutsurmoneau_rs::BASE_URL)]
    base_url: String,

    /// Bound on each network call, in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();
    let account = toutsurmoneau_rs::account(
        args.base_url,
        args.username,
        args.password,
        args.counter_id,
        args.timeout_secs.map(Duration::from_secs),
    );

    log::info!("collecting consumption for counter {}", account.counter_id);

    match toutsurmoneau_rs::update(&account).await {
        Ok(result) => match serde_json::to_string_pretty(&result) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("{}", e);
                ExitCode::from(1)
            }
        },
        Err(e) => {
            println!("{}", e);
            ExitCode::from(1)
        }
    }
}
