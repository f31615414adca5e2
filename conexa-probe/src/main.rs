//! Conexa Probe - connection test for Theben Conexa smart-meter gateways.

use std::process::ExitCode;

use clap::Parser;
use conexa_common::ProbeReport;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use conexa_probe::{Cli, Config, ProbeSession};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.overrides()).map_err(|e| {
        format!(
            "Failed to load configuration: {}. \
             Make sure .env or conexa.toml exists, or set CONEXA_IP_ADDRESS, CONEXA_USERNAME and CONEXA_PASSWORD environment variables.",
            e
        )
    })?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Theben Conexa HTTP Client {}", VERSION);
    tracing::info!("This is a connection test for the Theben Conexa Smart-Meter Gateway");

    let target = config.target();
    tracing::info!(
        "Connecting to {} (tls={}, verify={})",
        target,
        config.use_tls,
        config.verify
    );

    let session = ProbeSession::from_config(&config);
    let report = session.run(&target).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_summary(report: &ProbeReport) {
    if let Some(reachability) = &report.reachability {
        println!(
            "Reachability: dns={} ping={} address={}",
            reachability.dns_ok,
            reachability.ping_ok,
            reachability.resolved_address.as_deref().unwrap_or("-")
        );
        if let Some(error) = &reachability.error {
            println!("Reachability: {}", error);
        }
    }

    let Some(result) = &report.result else {
        println!("Gateway not probed: {} is unreachable", report.target);
        return;
    };

    if let Some(status) = result.status_code {
        println!("Status Code: {}", status);
    }
    if let Some(elapsed) = result.elapsed_ms {
        println!("Request time: {:.3} s", elapsed as f64 / 1000.0);
    }
    if let Some(version) = result.firmware_version() {
        println!("Firmware version of the Theben Conexa SMGW: {}", version);
    } else if let Some(body) = &result.body {
        println!("Response: {}", body);
    } else if let Some(text) = &result.raw_text {
        println!("Response: {}", text);
    }
    if let Some(error) = &result.error {
        println!("Error: {}", error);
    }
}
