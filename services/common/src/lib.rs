use std::{
    env,
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    panic,
    str::FromStr,
    thread,
    time::{Duration, SystemTime},
};
use tokio::net::TcpListener;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

const DEFAULT_LOG_DIR: &str = "/var/log/leaseaudit";

pub struct TracingGuards {
    _file_guard: Option<WorkerGuard>,
}

pub fn init_tracing(service_name: &str) -> TracingGuards {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_root = PathBuf::from(env_string("LOG_DIR", DEFAULT_LOG_DIR)).join(service_name);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let (file_layer, file_guard) = match rolling_writer(&log_root, service_name) {
        Some((writer, guard)) => (Some(fmt::layer().with_writer(writer)), Some(guard)),
        None => (None, None),
    };

    // An Option layer is a no-op when the log directory is unavailable.
    let subscriber = Registry::default()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);

    if file_guard.is_some() {
        let retention_days = env_or("LOG_RETENTION_DAYS", 14u64);
        let cleanup_interval = env_or("LOG_CLEANUP_INTERVAL_MINUTES", 360u64);
        spawn_log_cleanup(log_root, retention_days, cleanup_interval);
    } else {
        tracing::warn!(
            service = service_name,
            "log directory unavailable, logging to stdout only"
        );
    }

    TracingGuards {
        _file_guard: file_guard,
    }
}

fn rolling_writer(
    log_root: &Path,
    service_name: &str,
) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    fs::create_dir_all(log_root).ok()?;
    // The rolling appender panics when the directory is not writable.
    let appender = panic::catch_unwind(|| {
        tracing_appender::rolling::daily(log_root, format!("{service_name}.log"))
    })
    .ok()?;
    Some(tracing_appender::non_blocking(appender))
}

/// Typed environment lookup with a fallback for missing or unparsable values.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Environment value that is present and not blank.
pub fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn env_string(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

/// Boolean switch where anything except `0`, `false`, `no` and `off` is on.
pub fn env_flag(key: &str, default: bool) -> bool {
    env_opt(key)
        .map(|value| parse_flag(&value))
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

fn spawn_log_cleanup(log_root: PathBuf, retention_days: u64, cleanup_interval_minutes: u64) {
    if retention_days == 0 || cleanup_interval_minutes == 0 {
        return;
    }

    let retention = Duration::from_secs(retention_days * 24 * 60 * 60);
    let interval = Duration::from_secs(cleanup_interval_minutes * 60);

    thread::spawn(move || loop {
        if let Some(cutoff) = SystemTime::now().checked_sub(retention) {
            cleanup_old_logs(&log_root, cutoff);
        }
        thread::sleep(interval);
    });
}

fn cleanup_old_logs(root: &Path, cutoff: SystemTime) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            cleanup_old_logs(&path, cutoff);
            continue;
        }
        let modified = fs::metadata(&path).and_then(|metadata| metadata.modified());
        if matches!(modified, Ok(modified) if modified < cutoff) {
            let _ = fs::remove_file(&path);
        }
    }
}

pub async fn bind_listener(port: u16) -> std::io::Result<TcpListener> {
    // Bind on all interfaces for container compatibility.
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    Ok(listener)
}

pub async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "sigterm handler unavailable");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_on_garbage() {
        env::set_var("LEASEAUDIT_TEST_PORT", "not-a-port");
        assert_eq!(env_or("LEASEAUDIT_TEST_PORT", 8080u16), 8080);
        env::set_var("LEASEAUDIT_TEST_PORT", " 9090 ");
        assert_eq!(env_or("LEASEAUDIT_TEST_PORT", 8080u16), 9090);
        env::remove_var("LEASEAUDIT_TEST_PORT");
    }

    #[test]
    fn blank_values_are_missing() {
        env::set_var("LEASEAUDIT_TEST_BLANK", "   ");
        assert_eq!(env_opt("LEASEAUDIT_TEST_BLANK"), None);
        assert_eq!(env_string("LEASEAUDIT_TEST_BLANK", "fallback"), "fallback");
        env::remove_var("LEASEAUDIT_TEST_BLANK");
    }

    #[test]
    fn flags_parse_common_spellings() {
        assert!(!parse_flag("0"));
        assert!(!parse_flag("OFF"));
        assert!(!parse_flag("false"));
        assert!(parse_flag("1"));
        assert!(parse_flag("yes"));
    }

    #[test]
    fn cleanup_removes_only_stale_files() {
        let root = env::temp_dir().join(format!(
            "leaseaudit_logs_{}",
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join("nested").join("old.log"), "x").unwrap();

        let past = SystemTime::now() - Duration::from_secs(3600);
        cleanup_old_logs(&root, past);
        assert!(root.join("nested").join("old.log").exists());

        let future = SystemTime::now() + Duration::from_secs(3600);
        cleanup_old_logs(&root, future);
        assert!(!root.join("nested").join("old.log").exists());

        let _ = fs::remove_dir_all(&root);
    }
}
