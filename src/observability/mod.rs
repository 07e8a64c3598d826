//! 可观测性：tracing 订阅器初始化
//!
//! 缺省级别 info，`RUST_LOG` 可覆盖（例如 `RUST_LOG=flou=debug`）。
//! 日志写到 stderr，stdout 只留给二进制输出的 JSON 报告。

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 安装全局订阅器；重复调用（如测试里）时忽略
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = subscriber(filter, std::io::stderr).try_init();
}

fn subscriber<W>(filter: EnvFilter, writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(writer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_events_go_to_configured_writer() {
        let captured = Captured::default();
        let sink = captured.clone();
        let sub = subscriber(EnvFilter::new("info"), move || sink.clone());

        tracing::subscriber::with_default(sub, || {
            tracing::info!(session_id = "s-1", "Session started");
            tracing::debug!("filtered out");
        });

        let out = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(out.contains("Session started"));
        assert!(out.contains("s-1"));
        assert!(!out.contains("filtered out"));
    }
}
