use ivt_k30::{
    ClimateMode, DhwMode, Event, ExtraHotWater, FileCredentialStore, K30Client, MessageLogMode,
};
use std::env;
use std::io::{self, BufRead, Write as _};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One reversible change exercised against a live gateway.
#[derive(Debug, Clone, Copy)]
enum Step {
    ClimateTemperature(f64),
    ClimateMode(ClimateMode),
    WaterHeaterMode(DhwMode),
    ExtraHotWater(bool),
}

impl Step {
    async fn apply(self, client: &K30Client) -> ivt_k30::Result<()> {
        let cmd = match self {
            Step::ClimateTemperature(t) => client.set_climate_temperature(t).await?,
            Step::ClimateMode(m) => client.set_climate_mode(m).await?,
            Step::WaterHeaterMode(m) => client.set_water_heater_mode(m).await?,
            Step::ExtraHotWater(true) => {
                client
                    .start_extra_hot_water(ExtraHotWater {
                        duration_min: Some(15.0),
                        setpoint: None,
                    })
                    .await?
            }
            Step::ExtraHotWater(false) => client.stop_extra_hot_water().await?,
        };
        println!("  ✓ Command {} sent ({} writes)", cmd.id, cmd.writes.len());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ivt_k30::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let device = args
        .get(1)
        .expect("usage: validate_commands <device-id> <credentials.json> [--no-log]");
    let creds = args
        .get(2)
        .expect("usage: validate_commands <device-id> <credentials.json> [--no-log]");
    let no_log = args.iter().any(|a| a == "--no-log");

    let events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(vec![]));
    let events_clone = events.clone();

    let mut builder = K30Client::builder(device)
        .credential_store(Arc::new(FileCredentialStore::new(creds)))
        .on_event(move |event| {
            events_clone.lock().unwrap().push(event.clone());
        });

    let log_path = if !no_log {
        let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = format!("logs/validate_{ts}.ndjson");
        std::fs::create_dir_all("logs").ok();
        println!("Logging all requests/responses to {path}");
        builder = builder.message_log(MessageLogMode::Full, &path);
        Some(path)
    } else {
        None
    };

    let client = builder.build()?;
    if !client.restore().await? {
        panic!("no credential in {creds}; run the monitor demo first to log in");
    }

    println!("Reading initial state...");
    client.poll_once().await?;
    print_state(&client);

    let climate = client.climate_state();
    let dhw = client.water_heater_state();

    let mut cases: Vec<(&'static str, Step, Step)> = Vec::new();
    if let Some(mode) = climate.mode {
        let other = match mode {
            ClimateMode::Heat => ClimateMode::Auto,
            ClimateMode::Auto => ClimateMode::Heat,
        };
        cases.push(("Climate Mode", Step::ClimateMode(other), Step::ClimateMode(mode)));
    }
    if let (Some(ClimateMode::Heat), Some(target)) = (climate.mode, climate.target_temperature) {
        cases.push((
            "Room Setpoint",
            Step::ClimateTemperature(target + 0.5),
            Step::ClimateTemperature(target),
        ));
    } else {
        println!("⚠ Skipping setpoint test (needs manual mode and a known setpoint)");
    }
    if let Some(mode) = dhw.mode {
        let other = if mode == DhwMode::Eco { DhwMode::Comfort } else { DhwMode::Eco };
        cases.push(("Hot Water Mode", Step::WaterHeaterMode(other), Step::WaterHeaterMode(mode)));
    }
    cases.push((
        "Extra Hot Water",
        Step::ExtraHotWater(!dhw.extra_hot_water_running),
        Step::ExtraHotWater(dhw.extra_hot_water_running),
    ));

    let total = cases.len();
    for (i, (name, apply, revert)) in cases.into_iter().enumerate() {
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        println!("Test {}/{total}: {name}", i + 1);
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        println!("\n  → Will execute: {apply:?}");
        wait_for_enter("Press Enter to apply (Ctrl-C to abort)...");
        events.lock().unwrap().clear();
        apply.apply(&client).await?;
        confirm(&client, &events).await;
        wait_for_enter("Verify on the heat pump display, then press Enter to revert...");

        events.lock().unwrap().clear();
        revert.apply(&client).await?;
        confirm(&client, &events).await;
        println!("  ✓ Reverted\n");
    }

    println!("All tests complete.");
    if let Some(path) = log_path {
        println!("Full request/response log: {path}");
    }
    Ok(())
}

/// Polls once after a short settle time and prints what changed.
async fn confirm(client: &K30Client, events: &Arc<Mutex<Vec<Event>>>) {
    tokio::time::sleep(Duration::from_secs(5)).await;
    if let Err(e) = client.poll_once().await {
        println!("  ⚠ Poll failed: {e}");
    }
    for e in events.lock().unwrap().iter() {
        println!("  ← {e:?}");
    }
    print_state(client);
}

fn print_state(client: &K30Client) {
    let c = client.climate_state();
    let w = client.water_heater_state();
    println!(
        "  Climate: {:?}/{:?} room {} target {} | DHW: {:?} {} target {} extra={}",
        c.mode,
        c.preset,
        fmt_temp(c.room_temperature),
        fmt_temp(c.target_temperature),
        w.mode,
        fmt_temp(w.current_temperature),
        fmt_temp(w.target_temperature),
        w.extra_hot_water_running,
    );
}

fn fmt_temp(t: Option<f64>) -> String {
    t.map(|t| format!("{t:.1}°C")).unwrap_or_else(|| "-".into())
}

fn wait_for_enter(prompt: &str) {
    print!("  {prompt} ");
    io::stdout().flush().unwrap();
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).unwrap();
}
