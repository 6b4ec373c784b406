// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::collections::BTreeSet;
use std::iter::FromIterator;
use std::str::FromStr;
use std::time::Duration;

use slog::o;
use slog::Drain;

/// The default port on which the oltd API server listens.
pub const DEFAULT_OLTD_PORT: u16 = 12270;

/// Given two arrays, return two vectors containing only the unique items from each array.
pub fn purge_common<T>(a: &[T], b: &[T]) -> (Vec<T>, Vec<T>)
where
    T: std::cmp::Ord + std::clone::Clone,
{
    let set_a = BTreeSet::from_iter(a.to_vec());
    let set_b = BTreeSet::from_iter(b.to_vec());
    let common: BTreeSet<T> = set_a.intersection(&set_b).cloned().collect();

    (
        a.iter().filter(|e| !common.contains(e)).cloned().collect(),
        b.iter().filter(|e| !common.contains(e)).cloned().collect(),
    )
}

/// Return a random interval within a range
pub fn random_interval(min: Duration, max: Duration) -> Duration {
    assert!(min <= max);

    use rand::distributions::Distribution;
    let dist = rand::distributions::Uniform::new_inclusive(min, max);
    dist.sample(&mut rand::thread_rng())
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum LogFormat {
    Human,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "h" | "human" => Ok(LogFormat::Human),
            "j" | "json" => Ok(LogFormat::Json),
            _ => Err("invalid log format".to_string()),
        }
    }
}

pub fn log_init(
    name: &'static str,
    log_file: &Option<String>,
    log_format: LogFormat,
) -> anyhow::Result<slog::Logger> {
    let drain = match log_file {
        Some(log_file) => {
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(log_file)?;
            match log_format {
                LogFormat::Json => {
                    let drain =
                        slog_bunyan::with_name(name, log_file).build().fuse();
                    slog_async::Async::new(drain).build().fuse()
                }
                LogFormat::Human => {
                    let decorator = slog_term::PlainDecorator::new(log_file);
                    let drain =
                        slog_term::FullFormat::new(decorator).build().fuse();
                    slog_async::Async::new(drain).build().fuse()
                }
            }
        }
        None => match log_format {
            LogFormat::Json => {
                let drain = slog_bunyan::with_name(name, std::io::stdout())
                    .build()
                    .fuse();
                slog_async::Async::new(drain)
                    .chan_size(32768)
                    .build()
                    .fuse()
            }
            LogFormat::Human => {
                let decorator = slog_term::TermDecorator::new().build();
                let drain =
                    slog_term::FullFormat::new(decorator).build().fuse();
                slog_async::Async::new(drain)
                    .chan_size(32768)
                    .build()
                    .fuse()
            }
        },
    };
    Ok(slog::Logger::root(drain, o!()))
}

#[test]
fn test_purge() {
    let a = vec!["gpon-olt_1/1/1", "gpon-olt_1/1/2", "gpon-olt_1/2/1"];
    let b = vec!["gpon-olt_1/1/2", "gpon-olt_1/2/1", "gpon-olt_1/2/2"];
    let (mut unique_a, mut unique_b) = purge_common(&a, &b);
    unique_a.sort();
    unique_b.sort();
    assert_eq!(unique_a, vec!["gpon-olt_1/1/1"]);
    assert_eq!(unique_b, vec!["gpon-olt_1/2/2"]);

    let a = vec![300, 60, 30];
    let b = vec![30, 300];
    let (unique_a, unique_b) = purge_common(&a, &b);
    assert_eq!(unique_a, vec![60]);
    assert_eq!(unique_b, Vec::<i32>::new());
}
