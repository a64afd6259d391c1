use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use revenant_core::EnvironmentError;
use revenant_core::environment::{CommandOutput, CommandRunner};

#[derive(Debug, Default)]
struct Model {
    services: Vec<String>,
    running: BTreeSet<String>,
    /// Containers exist (running or stopped).
    created: bool,
    /// Log lines with the instant the runtime stamped them.
    logs: HashMap<String, Vec<(DateTime<Utc>, String)>>,
    /// Appended to a service's logs by the first `up` after a `kill`.
    restart_logs: HashMap<String, Vec<String>>,
    killed_since_up: bool,
    docker_missing: bool,
    fail_up: bool,
    fail_list_services: bool,
    invocations: Vec<Vec<String>>,
}

/// In-memory `docker compose`.
///
/// Understands the subset of compose the environment controller issues:
/// `version`, `ps`, `up -d`, `down`, `kill` and `logs`.
#[derive(Debug, Default)]
pub struct ScriptedCompose {
    model: Mutex<Model>,
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        code: Some(0),
        stdout: stdout.into(),
        stderr: String::new(),
    }
}

fn fail(stderr: impl Into<String>) -> CommandOutput {
    CommandOutput {
        code: Some(1),
        stdout: String::new(),
        stderr: stderr.into(),
    }
}

fn lines_of(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|l| (*l).to_owned()).collect()
}

fn container_id(service: &str) -> String {
    format!("cid-{service}")
}

impl ScriptedCompose {
    /// A project declaring `services`, with nothing created yet.
    pub fn new(services: &[&str]) -> Self {
        Self {
            model: Mutex::new(Model {
                services: lines_of(services),
                ..Model::default()
            }),
        }
    }

    /// Stopped containers from a previous run exist.
    pub fn with_leftovers(self) -> Self {
        self.model.lock().unwrap().created = true;
        self
    }

    /// Lines `service` has already printed, stamped with the current time.
    pub fn with_logs(self, service: &str, lines: &[&str]) -> Self {
        let now = Utc::now();
        self.model
            .lock()
            .unwrap()
            .logs
            .entry(service.to_owned())
            .or_default()
            .extend(lines.iter().map(|l| (now, (*l).to_owned())));
        self
    }

    /// Lines `service` prints once the stack is brought back after a kill.
    pub fn with_restart_logs(self, service: &str, lines: &[&str]) -> Self {
        self.model
            .lock()
            .unwrap()
            .restart_logs
            .entry(service.to_owned())
            .or_default()
            .extend(lines_of(lines));
        self
    }

    /// Spawning `docker` fails as if it were not installed.
    pub fn without_docker(self) -> Self {
        self.model.lock().unwrap().docker_missing = true;
        self
    }

    /// `up` exits non-zero.
    pub fn failing_up(self) -> Self {
        self.model.lock().unwrap().fail_up = true;
        self
    }

    /// `ps --services` exits non-zero, so running services cannot be listed.
    pub fn failing_service_listing(self) -> Self {
        self.model.lock().unwrap().fail_list_services = true;
        self
    }

    /// Every argument vector received, in order.
    pub fn invocations(&self) -> Vec<Vec<String>> {
        self.model.lock().unwrap().invocations.clone()
    }

    /// The compose subcommand of every invocation, in order.
    pub fn subcommands(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .filter_map(|args| split_compose(args).map(|(sub, _)| sub.to_owned()))
            .collect()
    }

    pub fn running(&self) -> Vec<String> {
        self.model.lock().unwrap().running.iter().cloned().collect()
    }

    fn respond(&self, args: &[String]) -> CommandOutput {
        let mut model = self.model.lock().unwrap();
        let Some((sub, rest)) = split_compose(args) else {
            return fail(format!("unsupported invocation: {args:?}"));
        };
        let flag = |f: &str| rest.iter().any(|a| a == f);
        let positional: Vec<&String> = rest.iter().filter(|a| !a.starts_with('-')).collect();

        match sub {
            "version" => ok("Docker Compose version v2.29.1\n"),
            "ps" if flag("--services") => {
                if model.fail_list_services {
                    return fail("error during connect: daemon not responding");
                }
                ok(join_lines(model.running.iter()))
            }
            "ps" if flag("-a") => {
                if model.created {
                    ok(join_lines(model.services.iter().map(|s| container_id(s))))
                } else {
                    ok("")
                }
            }
            "ps" => match positional.first() {
                Some(service) if model.running.contains(service.as_str()) => {
                    ok(format!("{}\n", container_id(service)))
                }
                _ => ok(""),
            },
            "up" => {
                if model.fail_up {
                    return fail("service \"app\" failed to start");
                }
                if model.killed_since_up {
                    let now = Utc::now();
                    let restart_logs = model.restart_logs.clone();
                    for (service, lines) in restart_logs {
                        let stamped = lines.into_iter().map(|l| (now, l));
                        model.logs.entry(service).or_default().extend(stamped);
                    }
                    model.killed_since_up = false;
                }
                model.running = model.services.iter().cloned().collect();
                model.created = true;
                ok("")
            }
            "down" => {
                model.running.clear();
                model.created = false;
                ok("")
            }
            "kill" => {
                if let Some(unknown) = positional.iter().find(|s| !model.services.contains(s)) {
                    return fail(format!("no such service: {unknown}"));
                }
                for service in positional {
                    if model.running.remove(service.as_str()) {
                        model.killed_since_up = true;
                    }
                }
                ok("")
            }
            "logs" => {
                // Option values follow their flag; the service is the last
                // argument.
                let value = |f: &str| {
                    rest.iter()
                        .position(|a| a == f)
                        .and_then(|i| rest.get(i + 1))
                };
                let tail = value("--tail")
                    .and_then(|n| n.parse::<usize>().ok())
                    .unwrap_or(usize::MAX);
                let since = match value("--since").map(|s| DateTime::parse_from_rfc3339(s)) {
                    None => None,
                    Some(Ok(t)) => Some(t.with_timezone(&Utc)),
                    Some(Err(e)) => return fail(format!("invalid --since value: {e}")),
                };
                let Some(service) = rest.last() else {
                    return fail("logs: no service given");
                };
                if !model.services.contains(service) {
                    return fail(format!("no such service: {service}"));
                }
                let lines: Vec<&String> = model
                    .logs
                    .get(service.as_str())
                    .map(|stamped| {
                        stamped
                            .iter()
                            .filter(|(at, _)| since.is_none_or(|since| *at >= since))
                            .map(|(_, line)| line)
                            .collect()
                    })
                    .unwrap_or_default();
                let skip = lines.len().saturating_sub(tail);
                ok(join_lines(lines.iter().skip(skip)))
            }
            other => fail(format!("unknown docker command: \"compose {other}\"")),
        }
    }
}

/// Split `compose [-f FILE] [-p NAME] <sub> <args…>`.
fn split_compose(args: &[String]) -> Option<(&str, &[String])> {
    if args.first().map(String::as_str) != Some("compose") {
        return None;
    }
    let mut i = 1;
    while i < args.len() && (args[i] == "-f" || args[i] == "-p") {
        i += 2;
    }
    let sub = args.get(i)?;
    Some((sub.as_str(), &args[i + 1..]))
}

fn join_lines<I, S>(lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for line in lines {
        out.push_str(line.as_ref());
        out.push('\n');
    }
    out
}

#[async_trait]
impl CommandRunner for ScriptedCompose {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _timeout: Duration,
    ) -> Result<CommandOutput, EnvironmentError> {
        {
            let mut model = self.model.lock().unwrap();
            model.invocations.push(args.to_vec());
            if model.docker_missing {
                return Err(EnvironmentError::Spawn {
                    program: program.to_owned(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "No such file or directory",
                    ),
                });
            }
        }
        Ok(self.respond(args))
    }
}
