//! `weathernode` - LoRaWAN weather-station end-device
//!
//! Boots the device, joins the network and runs the device shell on stdin.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::BufReader;

use weathernode::cli::{Cli, Command, ConfigCommand};
use weathernode::{app, init_logging, Config, Interrupt, Shell, SimulatedMac};

type BoxResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> BoxResult<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Run(run_cmd) => block_on(handle_run(&config, run_cmd.no_join)),
        Command::Exec(exec_cmd) => {
            block_on(handle_exec(&config, exec_cmd.no_join, &exec_cmd.args))
        }
        Command::Config(config_cmd) => {
            handle_config(&config, config_cmd)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Run a device task on a single-threaded runtime.
///
/// The runtime is shut down without waiting for the blocking stdin reader,
/// which would otherwise hold the process until the next line is typed.
fn block_on<F>(task: F) -> BoxResult<ExitCode>
where
    F: std::future::Future<Output = BoxResult<ExitCode>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(task);
    runtime.shutdown_background();
    result
}

async fn boot(config: &Config, no_join: bool) -> BoxResult<Option<Shell<SimulatedMac>>> {
    let interrupt = Interrupt::new();
    interrupt.listen_for_ctrl_c();

    match app::start(config, !no_join, interrupt, &mut std::io::stdout()).await {
        Ok(shell) => Ok(Some(shell)),
        // "Join procedure failed" is already printed.
        Err(e) if e.is_mac_error() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn handle_run(config: &Config, no_join: bool) -> BoxResult<ExitCode> {
    let Some(mut shell) = boot(config, no_join).await? else {
        return Ok(ExitCode::FAILURE);
    };

    let mut stdout = std::io::stdout();
    writeln!(stdout, "All up, running the shell now")?;
    shell
        .run(BufReader::new(tokio::io::stdin()), &mut stdout)
        .await?;

    Ok(ExitCode::SUCCESS)
}

async fn handle_exec(config: &Config, no_join: bool, args: &[String]) -> BoxResult<ExitCode> {
    let Some(mut shell) = boot(config, no_join).await? else {
        return Ok(ExitCode::FAILURE);
    };

    let status = shell.execute(args, &mut std::io::stdout()).await?;
    Ok(ExitCode::from(u8::try_from(status).unwrap_or(1)))
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> BoxResult<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Device]");
                println!("  DevEUI:             {}", config.device.dev_eui);
                println!("  AppEUI:             {}", config.device.app_eui);
                println!("  Join mode:          {}", config.device.join_mode);
                println!("  Join on start:      {}", config.device.join_on_start);
                println!("  Data rate:          {}", config.device.datarate);
                if let Some(dev_addr) = config.device.dev_addr {
                    println!("  DevAddr:            {dev_addr}");
                }
                println!();
                println!("[Weather]");
                println!("  Device id:          {}", config.weather.device_id);
                println!("  Interval (s):       {}", config.weather.interval_secs);
                match config.weather.iteration_limit() {
                    Some(limit) => println!("  Max iterations:     {limit}"),
                    None => println!("  Max iterations:     unbounded"),
                }
                println!();
                println!("[Simulator]");
                println!("  Join delay (ms):    {}", config.simulator.join_delay_ms);
                println!("  RX delay (ms):      {}", config.simulator.rx_delay_ms);
                println!("  Accept join:        {}", config.simulator.accept_join);
                println!(
                    "  Scripted downlinks: {}",
                    config.simulator.downlinks.len()
                );
                println!();
                println!("[Storage]");
                println!("  NVM path:           {}", config.nvm_path().display());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
