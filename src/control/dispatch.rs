//! Turns raw command lines into reply envelopes.
//!
//! A raw line is tokenized once, parsed against the grammar once, and run
//! through the handler table in registration order. All handler failures
//! are converted to text here, at the outermost boundary, so the transport
//! always has a reply to deliver.

use super::{
    COMMAND_ERROR_PREFIX, ControlLine, EXCEPTION_PREFIX, HANDLERS, RESULT_PREFIX, UNKNOWN_COMMAND,
};
use crate::controller::Controller;
use clap::Parser;
use clap::error::ErrorKind;
use std::sync::Arc;

/// Interpret one command line. Returns `None` for empty input (no dispatch,
/// no reply), otherwise the full envelope to send back.
pub async fn interpret(ctl: &Arc<Controller>, line: &str, interactive: bool) -> Option<String> {
    if line.trim().is_empty() {
        return None;
    }
    trace!("interpreting command: {line:?}");
    let words = match shell_words::split(line) {
        Ok(words) => words,
        Err(err) => return Some(format!("{EXCEPTION_PREFIX}{err}")),
    };
    let parsed = match ControlLine::try_parse_from(&words) {
        Ok(parsed) => parsed,
        Err(err) => {
            return Some(match err.kind() {
                // a cleanly tokenized line with a verb we don't know is not
                // an error, it is the unknown-command marker
                ErrorKind::InvalidSubcommand => format!("{RESULT_PREFIX}{UNKNOWN_COMMAND}"),
                ErrorKind::Io | ErrorKind::Format => format!("{EXCEPTION_PREFIX}{err}"),
                _ => format!("{COMMAND_ERROR_PREFIX}{err}"),
            });
        }
    };

    let command = parsed.command;
    for handler in HANDLERS {
        if !handler.matches(&command) {
            continue;
        }
        if handler.interactive_only && !interactive {
            debug!("ignoring {} on non-interactive session", handler.verb);
            continue;
        }
        let body = match command.execute(ctl, interactive).await {
            Ok(body) => body,
            Err(err) => format!("Command error: {err}"),
        };
        return Some(format!("{RESULT_PREFIX}{body}"));
    }
    Some(format!("{RESULT_PREFIX}{UNKNOWN_COMMAND}"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::Result;
    use crate::registry::ServiceRegistry;
    use crate::service::Service;
    use async_trait::async_trait;
    use miette::miette;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Start {
            names: Vec<String>,
            force: bool,
            wait: bool,
            enable: bool,
        },
        Stop {
            names: Vec<String>,
            force: bool,
            wait: bool,
            disable: bool,
        },
        Reset {
            names: Vec<String>,
            force: bool,
            wait: bool,
        },
        Enable(Vec<String>),
        Disable(Vec<String>),
    }

    #[derive(Default)]
    pub(crate) struct MockRegistry {
        pub calls: Mutex<Vec<Call>>,
        pub fail: bool,
    }

    impl MockRegistry {
        fn record(&self, call: Call) -> Result<()> {
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(call);
            if self.fail {
                Err(miette!("registry exploded"))
            } else {
                Ok(())
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }
    }

    #[async_trait]
    impl ServiceRegistry for MockRegistry {
        async fn start(
            &self,
            names: &[String],
            force: bool,
            wait: bool,
            enable: bool,
        ) -> Result<()> {
            self.record(Call::Start {
                names: names.to_vec(),
                force,
                wait,
                enable,
            })
        }

        async fn stop(
            &self,
            names: &[String],
            force: bool,
            wait: bool,
            disable: bool,
        ) -> Result<()> {
            self.record(Call::Stop {
                names: names.to_vec(),
                force,
                wait,
                disable,
            })
        }

        async fn reset(&self, names: &[String], force: bool, wait: bool) -> Result<()> {
            self.record(Call::Reset {
                names: names.to_vec(),
                force,
                wait,
            })
        }

        async fn enable(&self, names: &[String]) -> Result<()> {
            self.record(Call::Enable(names.to_vec()))
        }

        async fn disable(&self, names: &[String]) -> Result<()> {
            self.record(Call::Disable(names.to_vec()))
        }

        async fn values(&self) -> Vec<Service> {
            vec![]
        }

        async fn status_table(&self) -> String {
            "TABLE".to_string()
        }

        fn dependency_graph(&self) -> Vec<String> {
            vec!["api -> postgres".to_string(), "postgres".to_string()]
        }
    }

    pub(crate) fn make_controller() -> (Arc<Controller>, Arc<MockRegistry>) {
        let registry = Arc::new(MockRegistry::default());
        (Controller::new(registry.clone()), registry)
    }

    fn failing_controller() -> Arc<Controller> {
        Controller::new(Arc::new(MockRegistry {
            fail: true,
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_empty_line_is_noop() {
        let (ctl, registry) = make_controller();
        assert_eq!(interpret(&ctl, "", true).await, None);
        assert_eq!(interpret(&ctl, "   \t ", false).await, None);
        assert!(registry.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_verb_yields_marker() {
        let (ctl, _) = make_controller();
        assert_eq!(
            interpret(&ctl, "frobnicate", true).await,
            Some("RESULT\n?".to_string())
        );
    }

    #[tokio::test]
    async fn test_unbalanced_quote_is_exception() {
        let (ctl, _) = make_controller();
        let reply = interpret(&ctl, "start 'svc", true).await.unwrap();
        assert!(reply.starts_with("EXCEPTION\n"), "got {reply}");
    }

    #[tokio::test]
    async fn test_unknown_flag_is_command_error() {
        let (ctl, registry) = make_controller();
        let reply = interpret(&ctl, "stop --bogus", true).await.unwrap();
        assert!(reply.starts_with("COMMAND-ERROR\n"), "got {reply}");
        assert!(registry.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_services_means_all() {
        let (ctl, registry) = make_controller();
        interpret(&ctl, "stop", true).await.unwrap();
        interpret(&ctl, "start", true).await.unwrap();
        interpret(&ctl, "reset", true).await.unwrap();
        assert_eq!(
            registry.calls(),
            vec![
                Call::Stop {
                    names: vec![],
                    force: false,
                    wait: false,
                    disable: false,
                },
                Call::Start {
                    names: vec![],
                    force: false,
                    wait: false,
                    enable: false,
                },
                Call::Reset {
                    names: vec![],
                    force: false,
                    wait: false,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_wait_forced_false_on_non_interactive_session() {
        let (ctl, registry) = make_controller();

        let reply = interpret(&ctl, "start --wait svcA", false).await.unwrap();
        assert_eq!(reply, "RESULT\nservice start-up queued.");

        let reply = interpret(&ctl, "start --wait svcA", true).await.unwrap();
        assert_eq!(reply, "RESULT\nservices started.");

        assert_eq!(
            registry.calls(),
            vec![
                Call::Start {
                    names: vec!["svcA".to_string()],
                    force: false,
                    wait: false,
                    enable: false,
                },
                Call::Start {
                    names: vec!["svcA".to_string()],
                    force: false,
                    wait: true,
                    enable: false,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_flags_pass_through() {
        let (ctl, registry) = make_controller();
        let reply = interpret(&ctl, "stop --force --wait --disable api db", true)
            .await
            .unwrap();
        assert_eq!(reply, "RESULT\nservices stopped.");
        assert_eq!(
            registry.calls(),
            vec![Call::Stop {
                names: vec!["api".to_string(), "db".to_string()],
                force: true,
                wait: true,
                disable: true,
            }]
        );
    }

    #[tokio::test]
    async fn test_enable_disable() {
        let (ctl, registry) = make_controller();
        assert_eq!(
            interpret(&ctl, "enable api", false).await.unwrap(),
            "RESULT\nservices enabled."
        );
        assert_eq!(
            interpret(&ctl, "disable api db", false).await.unwrap(),
            "RESULT\nservices disabled."
        );
        assert_eq!(
            registry.calls(),
            vec![
                Call::Enable(vec!["api".to_string()]),
                Call::Disable(vec!["api".to_string(), "db".to_string()]),
            ]
        );
    }

    #[tokio::test]
    async fn test_interactive_only_gating() {
        let (ctl, _) = make_controller();

        assert_eq!(
            interpret(&ctl, "status", false).await,
            Some("RESULT\n?".to_string())
        );
        assert_eq!(
            interpret(&ctl, "dependencies", false).await,
            Some("RESULT\n?".to_string())
        );

        let reply = interpret(&ctl, "status", true).await.unwrap();
        assert!(reply.contains("Managed processes: 0 (0 enabled)"), "got {reply}");
        assert!(reply.contains("TABLE"));

        assert_eq!(
            interpret(&ctl, "dependencies", true).await,
            Some("RESULT\napi -> postgres\npostgres".to_string())
        );
    }

    #[tokio::test]
    async fn test_status_is_deterministic() {
        let (ctl, _) = make_controller();
        let first = interpret(&ctl, "dependencies", true).await;
        let second = interpret(&ctl, "dependencies", true).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_loglevel_get_and_set() {
        let (ctl, _) = make_controller();
        assert_eq!(
            interpret(&ctl, "loglevel", true).await,
            Some("RESULT\nForced Logging Level: NOT SET".to_string())
        );
        assert_eq!(
            interpret(&ctl, "loglevel warning", true).await,
            Some("RESULT\nAll logging set to include priorities >= *.warning".to_string())
        );
        assert_eq!(
            interpret(&ctl, "loglevel", true).await,
            Some("RESULT\n*.warning".to_string())
        );
        // leading *. is normalized away
        assert_eq!(
            interpret(&ctl, "loglevel *.info", true).await,
            Some("RESULT\nAll logging set to include priorities >= *.info".to_string())
        );
    }

    #[tokio::test]
    async fn test_loglevel_invalid_is_handler_error() {
        let (ctl, _) = make_controller();
        let reply = interpret(&ctl, "loglevel loud", true).await.unwrap();
        assert_eq!(
            reply,
            "RESULT\nCommand error: unknown logging priority: loud"
        );
    }

    #[tokio::test]
    async fn test_handler_error_stays_in_envelope() {
        let ctl = failing_controller();
        let reply = interpret(&ctl, "enable api", true).await.unwrap();
        assert_eq!(reply, "RESULT\nCommand error: registry exploded");
    }

    #[tokio::test]
    async fn test_shutdown_invalid_delay_does_not_schedule() {
        let (ctl, _) = make_controller();
        let reply = interpret(&ctl, "shutdown abc", true).await.unwrap();
        assert_eq!(
            reply,
            "RESULT\nSpecified delay is not a valid decimal number: abc"
        );
        time::sleep(Duration::from_millis(300)).await;
        assert!(!ctl.shutdown_requested());
    }

    #[tokio::test]
    async fn test_shutdown_huge_delay_schedules_far_future() {
        let (ctl, _) = make_controller();
        let reply = interpret(&ctl, "shutdown 1e300", true).await.unwrap();
        assert_eq!(reply, "RESULT\nShutting down in 1e300 seconds");
        time::sleep(Duration::from_millis(200)).await;
        assert!(!ctl.shutdown_requested());
    }

    #[tokio::test]
    async fn test_shutdown_non_finite_delay_is_rejected() {
        let (ctl, _) = make_controller();
        let reply = interpret(&ctl, "shutdown inf", true).await.unwrap();
        assert_eq!(
            reply,
            "RESULT\nSpecified delay is not a valid decimal number: inf"
        );
        let reply = interpret(&ctl, "shutdown nan", true).await.unwrap();
        assert_eq!(
            reply,
            "RESULT\nSpecified delay is not a valid decimal number: nan"
        );
        time::sleep(Duration::from_millis(200)).await;
        assert!(!ctl.shutdown_requested());
    }

    #[tokio::test]
    async fn test_shutdown_now_schedules_promptly() {
        let (ctl, _) = make_controller();
        let reply = interpret(&ctl, "shutdown now", true).await.unwrap();
        assert_eq!(reply, "RESULT\nShutting down now");
        assert!(!ctl.shutdown_requested());
        time::sleep(Duration::from_millis(300)).await;
        assert!(ctl.shutdown_requested());
    }

    #[tokio::test]
    async fn test_shutdown_with_delay() {
        let (ctl, _) = make_controller();
        let reply = interpret(&ctl, "shutdown 0.2", true).await.unwrap();
        assert_eq!(reply, "RESULT\nShutting down in 0.2 seconds");
        assert!(!ctl.shutdown_requested());
        time::sleep(Duration::from_millis(500)).await;
        assert!(ctl.shutdown_requested());
    }
}
