//! usbkvm: command-line front end for a CH9329 USB-KVM controller.
//!
//! Each subcommand opens the controller, performs one action through the
//! same dispatcher and session the interactive client uses, then closes the
//! controller again.  `run` keeps the session alive (device checks, mouse
//! flushes, reconnects) until Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! usbkvm [OPTIONS] <COMMAND>
//!
//! Commands:
//!   info        Print the chip's USB product string
//!   indicators  Print the remote lock-key indicators
//!   type        Type a line of ASCII text on the remote host
//!   keys        Press a chord of named keys, e.g. `keys ctrl alt delete`
//!   shortcut    Send a chord from the config's [shortcut_keys] table
//!   release     Release held keys and/or buttons
//!   reset       Soft-reset the chip
//!   run         Keep a session open until Ctrl+C
//!
//! Options:
//!   --config <PATH>  Config file [env: USBKVM_CONFIG]
//!   --port <PORT>    Serial port, or "auto" [env: USBKVM_PORT]
//!   --baud <BAUD>    Baud rate [env: USBKVM_BAUD]
//!   --dry-run        Record frames instead of opening a serial port
//! ```
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ ConnectionManager (SerialOpener | MockOpener)
//!  └─ CommandDispatcher::spawn()   -- hid-dispatch thread
//!  └─ ControllerSession            -- owns InputTranslator
//!       └─ one subcommand, or run() until Ctrl+C
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use usbkvm_client::application::controller::Controller;
use usbkvm_client::application::dispatcher::CommandDispatcher;
use usbkvm_client::application::input_translator::{DetachedCursor, InputTranslator};
use usbkvm_client::application::session::ControllerSession;
use usbkvm_client::infrastructure::connection_manager::ConnectionManager;
use usbkvm_client::infrastructure::serial::ch9329::SerialOpener;
use usbkvm_client::infrastructure::serial::mock::{MockOpener, MockRecorder};
use usbkvm_client::infrastructure::serial::LinkOpener;
use usbkvm_client::infrastructure::storage::config::{load_config, AppConfig};
use usbkvm_core::{CommandName, CommandReply, PointerMode, ReleaseTarget, ReplyData};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Drive a CH9329 USB-KVM controller from the command line.
#[derive(Debug, Parser)]
#[command(name = "usbkvm", version)]
struct Cli {
    /// Path to the TOML config file.  Defaults to the platform config dir.
    #[arg(long, env = "USBKVM_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port to open; overrides `[controller] port`.
    #[arg(long, env = "USBKVM_PORT")]
    port: Option<String>,

    /// Baud rate; overrides `[controller] baud_rate`.
    #[arg(long, env = "USBKVM_BAUD")]
    baud: Option<u32>,

    /// Record frames in memory instead of opening a serial port.
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Print the chip's USB product string.
    Info,
    /// Print the remote lock-key indicators.
    Indicators,
    /// Type ASCII text on the remote host.
    Type { text: String },
    /// Press named keys together, then release them.
    Keys {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Send a chord from the `[shortcut_keys]` table.
    Shortcut { name: String },
    /// Release held keys and/or mouse buttons.
    Release {
        #[arg(default_value = "all")]
        target: ReleaseTarget,
    },
    /// Soft-reset the chip.
    Reset,
    /// Keep a session open until Ctrl+C.
    Run {
        /// Report relative motion instead of absolute positions.
        #[arg(long)]
        relative: bool,
    },
}

impl Cli {
    /// Loads the config file and applies command-line overrides.
    fn load_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = load_config(self.config.as_deref()).context("failed to load config")?;
        if let Some(port) = &self.port {
            config.controller.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.controller.baud_rate = baud;
        }
        Ok(config)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Feeds replies to the session until the reply to `name` arrives.
async fn await_reply(
    session: &mut ControllerSession,
    replies: &mut mpsc::UnboundedReceiver<CommandReply>,
    name: CommandName,
) -> anyhow::Result<CommandReply> {
    while let Some(reply) = replies.recv().await {
        session.handle_reply(&reply)?;
        if reply.command == name {
            return Ok(reply);
        }
    }
    bail!("dispatcher stopped before replying to {name}")
}

async fn execute(
    command: CliCommand,
    config: &AppConfig,
    session: &mut ControllerSession,
    replies: &mut mpsc::UnboundedReceiver<CommandReply>,
) -> anyhow::Result<()> {
    match command {
        CliCommand::Info => {
            session.request_info()?;
            let reply = await_reply(session, replies, CommandName::DeviceInfo).await?;
            match reply.data {
                ReplyData::Text(product) => println!("{product}"),
                other => warn!(?other, "unexpected device_info reply"),
            }
            if !reply.status.is_success() {
                bail!("could not read product string: {:?}", reply.status);
            }
        }
        CliCommand::Indicators => {
            session.translator().indicators().request_refresh()?;
            let reply = await_reply(session, replies, CommandName::KeyboardRead).await?;
            if !reply.is_success() {
                bail!("could not read indicators: {:?}", reply.status);
            }
            let report = session.translator().indicators().indicators();
            println!(
                "usb={} num_lock={} caps_lock={} scroll_lock={}",
                report.usb_connected, report.num_lock, report.caps_lock, report.scroll_lock
            );
        }
        CliCommand::Type { text } => {
            // Fresh indicators so caps lock is handled correctly.
            session.translator().indicators().request_refresh()?;
            await_reply(session, replies, CommandName::KeyboardRead).await?;
            session.translator_mut().type_text(&text).await?;
        }
        CliCommand::Keys { names } => {
            session.translator_mut().send_key_names(&names).await?;
        }
        CliCommand::Shortcut { name } => {
            let Some(keys) = config.shortcut(&name) else {
                bail!("no shortcut named {name:?} in [shortcut_keys]");
            };
            session.translator_mut().send_key_names(keys).await?;
        }
        CliCommand::Release { target } => {
            session.release(target)?;
        }
        CliCommand::Reset => {
            session.reset()?;
            await_reply(session, replies, CommandName::DeviceReset).await?;
        }
        CliCommand::Run { relative } => {
            if relative {
                session.translator_mut().set_pointer_mode(PointerMode::Relative);
            }
            info!("session running, press Ctrl+C to stop");
            session
                .run(replies, async {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("shutdown signal received");
                    }
                })
                .await?;
        }
    }
    Ok(())
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` wins; otherwise the config's `[logging] level` applies.
    let fallback_level = config.logging.level.clone();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_level)),
        )
        .init();

    info!(
        port = %config.controller.port,
        baud = config.controller.baud_rate,
        dry_run = cli.dry_run,
        "usbkvm starting"
    );

    // ── Controller and dispatcher ─────────────────────────────────────────────
    let (opener, recorder): (Box<dyn LinkOpener>, Option<MockRecorder>) = if cli.dry_run {
        let opener = MockOpener::new();
        let recorder = opener.recorder();
        (Box::new(opener), Some(recorder))
    } else {
        (Box::new(SerialOpener), None)
    };
    let controller: Arc<dyn Controller> =
        Arc::new(ConnectionManager::new(opener, config.serial_settings()));
    let (dispatcher, mut replies) =
        CommandDispatcher::spawn(controller).context("failed to start dispatcher")?;

    let translator = InputTranslator::new(
        dispatcher.handle(),
        Arc::new(DetachedCursor),
        config.translator_settings(),
    );
    let mut session =
        ControllerSession::new(dispatcher.handle(), translator, config.report_interval());

    // ── Open ──────────────────────────────────────────────────────────────────
    session.connect()?;
    let opened = await_reply(&mut session, &mut replies, CommandName::DeviceOpen).await?;
    if !opened.is_success() {
        bail!(
            "could not open controller on port {:?}",
            config.controller.port
        );
    }

    // ── Command ───────────────────────────────────────────────────────────────
    let outcome = execute(cli.command, &config, &mut session, &mut replies).await;

    // ── Close ─────────────────────────────────────────────────────────────────
    //
    // The close reply comes after every command queued before it, so once it
    // arrives all writes have reached the link.
    session.disconnect()?;
    await_reply(&mut session, &mut replies, CommandName::DeviceClose).await?;
    drop(session);
    tokio::task::spawn_blocking(move || dispatcher.join())
        .await
        .context("dispatcher join task failed")?;

    if let Some(recorder) = recorder {
        for event in recorder.events() {
            println!("{event:?}");
        }
    }

    info!("usbkvm stopped");
    outcome
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_defaults_to_all() {
        let cli = Cli::parse_from(["usbkvm", "release"]);
        match cli.command {
            CliCommand::Release { target } => assert_eq!(target, ReleaseTarget::All),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_release_target_parses() {
        let cli = Cli::parse_from(["usbkvm", "release", "mouse"]);
        assert!(matches!(
            cli.command,
            CliCommand::Release {
                target: ReleaseTarget::Mouse
            }
        ));
    }

    #[test]
    fn test_invalid_release_target_is_rejected() {
        assert!(Cli::try_parse_from(["usbkvm", "release", "joystick"]).is_err());
    }

    #[test]
    fn test_keys_require_at_least_one_name() {
        assert!(Cli::try_parse_from(["usbkvm", "keys"]).is_err());
        let cli = Cli::parse_from(["usbkvm", "keys", "ctrl", "alt", "delete"]);
        assert!(matches!(cli.command, CliCommand::Keys { ref names } if names.len() == 3));
    }

    #[test]
    fn test_port_and_baud_override_config() {
        // Arrange
        let cli = Cli::parse_from([
            "usbkvm",
            "--config",
            "/nonexistent/usbkvm/config.toml",
            "--port",
            "/dev/ttyACM0",
            "--baud",
            "115200",
            "reset",
        ]);

        // Act
        let config = cli.load_config().unwrap();

        // Assert
        assert_eq!(config.controller.port, "/dev/ttyACM0");
        assert_eq!(config.controller.baud_rate, 115200);
    }

    #[test]
    fn test_dry_run_flag() {
        let cli = Cli::parse_from(["usbkvm", "--dry-run", "run", "--relative"]);
        assert!(cli.dry_run);
        assert!(matches!(cli.command, CliCommand::Run { relative: true }));
    }
}
