// Copyright 2026 vbsfs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{filter, fmt, prelude::*, EnvFilter, Registry};

pub const DEFAULT_LOG_DIR: &str = "/tmp/vbsfs.logs";

const DEFAULT_LEVEL: &str = "info";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    pub dir: String,
    pub level: Option<String>,
    pub append_stdout: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            dir: DEFAULT_LOG_DIR.to_string(),
            level: None,
            append_stdout: true,
        }
    }
}

impl LoggingOptions {
    pub fn with_dir(self, dir: String) -> Self {
        Self { dir, ..self }
    }
}

/// An explicit level option wins over `RUST_LOG`, which wins over "info".
fn verbosity(level: Option<&str>) -> filter::Targets {
    let env_level = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    level
        .or(env_level.as_deref())
        .unwrap_or(DEFAULT_LEVEL)
        .parse()
        .expect("unparseable log level")
}

fn hourly_file(dir: &str, prefix: String) -> (NonBlocking, WorkerGuard) {
    tracing_appender::non_blocking(RollingFileAppender::new(Rotation::HOURLY, dir, prefix))
}

/// Install the global subscriber. Everything lands in an hourly rolling file
/// under `opts.dir`, errors additionally in a file of their own, and the
/// formatted output goes to stdout unless switched off. The returned guards
/// flush the writers; keep them alive for as long as the process logs.
pub fn init_global_logging(app_name: &str, opts: &LoggingOptions) -> Vec<WorkerGuard> {
    let mut guards = Vec::new();

    let (all_events, guard) = hourly_file(&opts.dir, app_name.to_string());
    guards.push(guard);
    let (errors_only, guard) = hourly_file(&opts.dir, format!("{}-err", app_name));
    guards.push(guard);

    let console = opts.append_stdout.then(|| {
        let (stdout, guard) = tracing_appender::non_blocking(std::io::stdout());
        guards.push(guard);
        fmt::layer().with_writer(stdout)
    });

    let with_origin = fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_ansi(supports_color::on(supports_color::Stream::Stdout).is_some());

    let subscriber = Registry::default()
        .with(with_origin)
        .with(verbosity(opts.level.as_deref()))
        .with(console)
        .with(fmt::layer().with_writer(all_events))
        .with(
            fmt::layer()
                .with_writer(errors_only)
                .with_filter(filter::LevelFilter::ERROR),
        );

    tracing::subscriber::set_global_default(subscriber)
        .expect("a global subscriber is already installed");

    guards
}

/// Pretty stdout-only logging for tests. Installing twice is harmless.
#[allow(dead_code)]
pub fn install_fmt_log() {
    let subscriber = Registry::default().with(fmt::layer().pretty());
    let _ = tracing::subscriber::set_global_default(subscriber);
}
