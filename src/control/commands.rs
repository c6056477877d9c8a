//! Per-verb execution against the controller.

use super::ControlCommand;
use crate::Result;
use crate::controller::Controller;
use crate::logger::SyslogPriority;
use miette::miette;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

impl ControlCommand {
    /// Execute a matched command. `interactive` is true only inside a
    /// request/response session; it is what allows `--wait` to hold the
    /// reply open. Errors are rendered by the dispatch boundary, not here.
    pub(crate) async fn execute(&self, ctl: &Arc<Controller>, interactive: bool) -> Result<String> {
        match self {
            ControlCommand::Status => {
                let services = ctl.services.values().await;
                let enabled = services.iter().filter(|s| s.enabled).count();
                Ok(format!(
                    "\nRunning:           {}\nUptime:            {}\nManaged processes: {} ({} enabled)\n\nServices:\n\n{}\n",
                    ctl.version(),
                    humantime::format_duration(ctl.uptime()),
                    services.len(),
                    enabled,
                    ctl.services.status_table().await,
                ))
            }
            ControlCommand::Dependencies => Ok(ctl.services.dependency_graph().join("\n")),
            ControlCommand::Loglevel { level } => match level {
                None => Ok(match ctl.forced_log_level() {
                    Some(priority) => format!("*.{priority}"),
                    None => "Forced Logging Level: NOT SET".to_string(),
                }),
                Some(level) => {
                    let name = level.strip_prefix("*.").unwrap_or(level).to_lowercase();
                    let priority = SyslogPriority::from_str(&name)
                        .map_err(|_| miette!("unknown logging priority: {name}"))?;
                    ctl.force_log_level(priority);
                    Ok(format!(
                        "All logging set to include priorities >= *.{priority}"
                    ))
                }
            },
            ControlCommand::Stop {
                force,
                wait,
                disable,
                services,
            } => {
                let wait = *wait && interactive;
                ctl.services.stop(services, *force, wait, *disable).await?;
                if wait {
                    Ok("services stopped.".to_string())
                } else {
                    Ok("services stopping.".to_string())
                }
            }
            ControlCommand::Start {
                force,
                wait,
                enable,
                services,
            } => {
                let wait = *wait && interactive;
                ctl.services.start(services, *force, wait, *enable).await?;
                if wait {
                    Ok("services started.".to_string())
                } else {
                    Ok("service start-up queued.".to_string())
                }
            }
            ControlCommand::Reset {
                force,
                wait,
                services,
            } => {
                let wait = *wait && interactive;
                ctl.services.reset(services, *force, wait).await?;
                Ok("services reset.".to_string())
            }
            ControlCommand::Enable { services } => {
                ctl.services.enable(services).await?;
                Ok("services enabled.".to_string())
            }
            ControlCommand::Disable { services } => {
                ctl.services.disable(services).await?;
                Ok("services disabled.".to_string())
            }
            ControlCommand::Shutdown { delay } => {
                let (delay, message) = match delay.as_deref() {
                    None => (0.1, "Shutting down now".to_string()),
                    Some(d) if d.eq_ignore_ascii_case("now") => {
                        (0.1, "Shutting down now".to_string())
                    }
                    Some(d) => match d.parse::<f64>() {
                        Ok(secs) if secs.is_finite() => {
                            (secs, format!("Shutting down in {secs} seconds"))
                        }
                        _ => {
                            // user-visible validation message, nothing scheduled
                            return Ok(format!(
                                "Specified delay is not a valid decimal number: {d}"
                            ));
                        }
                    },
                };
                info!("requested shutdown scheduled to occur in {delay} seconds");
                // delays beyond Duration's range just schedule far-future
                let delay = Duration::try_from_secs_f64(delay.max(0.0)).unwrap_or(Duration::MAX);
                let ctl = ctl.clone();
                tokio::spawn(async move {
                    time::sleep(delay).await;
                    ctl.kill_system();
                });
                Ok(message)
            }
        }
    }
}
