use ivt_k30::{FileCredentialStore, K30Client};
use std::env;
use std::io::{self, BufRead, Write as _};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ivt_k30::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let device = args
        .get(1)
        .expect("usage: monitor <device-id> [credentials.json] [--interval <secs>]");
    let creds = args
        .get(2)
        .filter(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| "k30-credentials.json".into());
    let interval: u64 = args
        .iter()
        .position(|a| a == "--interval")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);

    let client = K30Client::builder(device)
        .credential_store(Arc::new(FileCredentialStore::new(&creds)))
        .poll_interval(Duration::from_secs(interval))
        .on_event(|event| {
            println!("{event:?}");
        })
        .build()?;

    if !client.restore().await? {
        println!("No stored credential. Log in here:\n\n{}\n", client.authorization_url());
        print!("Paste the final redirect URL: ");
        io::stdout().flush().ok();
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        client.exchange_redirect(line.trim()).await?;
        println!("Credential saved to {creds}");
    }

    let firmware = client.test_connection().await?;
    println!("Connected to {device} (firmware {firmware}). Polling every {interval}s...");

    let cancel = CancellationToken::new();
    let poll = client.start_polling(cancel.clone());

    loop {
        tokio::time::sleep(Duration::from_secs(interval)).await;
        if poll.is_finished() {
            eprintln!("Poll loop stopped; re-authorization required.");
            break;
        }
        let climate = client.climate_state();
        let dhw = client.water_heater_state();
        println!(
            "Room {} (target {}) | mode {:?} preset {:?} | DHW {} mode {:?}{}",
            fmt_temp(climate.room_temperature),
            fmt_temp(climate.target_temperature),
            climate.mode,
            climate.preset,
            fmt_temp(dhw.current_temperature),
            dhw.mode,
            if dhw.extra_hot_water_running { " | EXTRA" } else { "" },
        );
    }

    cancel.cancel();
    Ok(())
}

fn fmt_temp(t: Option<f64>) -> String {
    t.map(|t| format!("{t:.1}\u{00b0}C")).unwrap_or_else(|| "-".into())
}
