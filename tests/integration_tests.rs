use serialmon::core::transport::{ControlLines, TransportEvent};
use serialmon::domain::config::MonitorSettings;
use serialmon::infrastructure::serial::{MockFailure, MockTransportFactory, TransportCall};
use serialmon::infrastructure::sinks::{FileLogSink, MemorySink};
use serialmon::{ConnectionController, ConnectionState, DualSink, LineBufferedInputRouter};
use async_trait::async_trait;
use serialmon::core::transport::{
    OpenOptions, SerialTransport, TransportEvents, TransportFactory, TransportResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// End-to-end session tests: terminal input, router, controller and transport
#[cfg(test)]
mod integration_tests {
    use super::*;
    use serialmon::core::SharedRouter;

    struct Monitor {
        factory: MockTransportFactory,
        terminal: Arc<MemorySink>,
        log: Arc<MemorySink>,
        router: SharedRouter,
        controller: Arc<ConnectionController>,
    }

    fn monitor(settings: MonitorSettings) -> Monitor {
        let factory = MockTransportFactory::new();
        let terminal = Arc::new(MemorySink::new());
        let log = Arc::new(MemorySink::new());
        let sink = Arc::new(DualSink::new(log.clone(), terminal.clone()));
        let router = LineBufferedInputRouter::shared(sink.clone());
        let controller = ConnectionController::new(
            "COM3",
            115200,
            sink,
            router.clone(),
            Arc::new(factory.clone()),
            Arc::new(settings),
        );
        Monitor {
            factory,
            terminal,
            log,
            router,
            controller,
        }
    }

    fn written(factory: &MockTransportFactory) -> Vec<Vec<u8>> {
        factory
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Write(bytes) => Some(bytes),
                _ => None,
            })
            .collect()
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_typed_line_reaches_device() {
        let m = monitor(MonitorSettings::default());
        m.controller.open().await.unwrap();
        m.factory.clear_calls();

        {
            let mut router = m.router.lock().await;
            router.handle_input("A").await;
            router.handle_input("B\r").await;
            router.handle_input("C").await;
            assert_eq!(router.pending(), "C");
        }

        assert_eq!(written(&m.factory), vec![b"AB\r\n".to_vec()]);
        assert!(m.terminal.contents().ends_with("AB\r\nC"));
        assert!(m.log.contents().ends_with("AB\r\nC"));
    }

    #[tokio::test]
    async fn test_input_before_open_is_echoed_only() {
        let m = monitor(MonitorSettings::default());

        m.router.lock().await.handle_input("hello\r").await;

        assert!(m.factory.calls().is_empty());
        assert_eq!(m.terminal.contents(), "hello\r\n");
    }

    #[tokio::test]
    async fn test_input_after_stop_is_dropped() {
        let m = monitor(MonitorSettings::default());
        m.controller.open().await.unwrap();

        assert!(m.controller.stop().await.unwrap());
        m.factory.clear_calls();

        m.router.lock().await.handle_input("late\r").await;

        assert!(m.factory.calls().is_empty());
        assert!(m.terminal.contents().contains("[Done] Closed the serial port"));
        assert!(m.terminal.contents().ends_with("late\r\n"));
    }

    #[tokio::test]
    async fn test_device_output_reaches_terminal_and_log() {
        let m = monitor(MonitorSettings::default());
        m.controller.open().await.unwrap();

        assert!(m.factory.emit(TransportEvent::Data("boot ok\r\n".as_bytes().to_vec())));
        assert!(m.factory.emit(TransportEvent::Data(vec![0xe2, 0x82])));
        assert!(m.factory.emit(TransportEvent::Data(vec![0xac])));
        settle().await;

        for contents in [m.terminal.contents(), m.log.contents()] {
            assert!(contents.contains("boot ok\r\n"));
            assert!(contents.contains('\u{20ac}'));
        }
    }

    #[tokio::test]
    async fn test_driver_error_is_reported() {
        let m = monitor(MonitorSettings::default());
        m.controller.open().await.unwrap();

        assert!(m.factory.emit(TransportEvent::Error("device disconnected".to_string())));
        settle().await;

        assert!(m.terminal.contents().contains("[Error] device disconnected"));
        assert!(m.log.contents().contains("[Error] device disconnected"));
    }

    #[tokio::test]
    async fn test_concurrent_opens_keep_one_handle() {
        let m = monitor(MonitorSettings::default());

        let (first, second, third) = tokio::join!(
            m.controller.open(),
            m.controller.open(),
            m.controller.open()
        );
        first.unwrap();
        second.unwrap();
        third.unwrap();

        assert_eq!(m.factory.open_count(), 3);
        assert_eq!(m.factory.live_handles(), 1);
        assert_eq!(m.controller.state(), ConnectionState::Active);
    }

    #[tokio::test]
    async fn test_switch_port_then_reopen() {
        let m = monitor(MonitorSettings::default());
        m.controller.open().await.unwrap();

        m.controller.change_port("COM7").await.unwrap();
        assert_eq!(m.controller.state(), ConnectionState::Inactive);
        assert_eq!(m.factory.live_handles(), 0);

        m.controller.open().await.unwrap();
        assert_eq!(m.controller.current_port(), "COM7");
        assert_eq!(m.factory.live_handles(), 1);
        assert!(m
            .terminal
            .contents()
            .contains("[Info] Opened the serial port - COM7"));
    }

    #[tokio::test]
    async fn test_baud_rate_change_while_active() {
        let m = monitor(MonitorSettings::default());
        m.controller.open().await.unwrap();
        m.factory.clear_calls();

        m.controller.change_baud_rate(9600).await.unwrap();

        let calls = m.factory.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], TransportCall::Update(update) if update.baud_rate == 9600));
        assert_eq!(calls[1], TransportCall::Set(ControlLines::ASSERTED));
        assert_eq!(m.controller.baud_rate(), 9600);
    }

    #[tokio::test]
    async fn test_failed_open_can_be_retried() {
        let m = monitor(MonitorSettings::default());
        m.factory.fail_next_open(MockFailure::message("Access denied"));

        assert!(m.controller.open().await.is_err());
        assert_eq!(m.controller.state(), ConnectionState::Inactive);
        assert!(m.terminal.contents().contains("[Error]"));

        m.controller.open().await.unwrap();
        assert!(m.controller.is_active());
    }

    #[tokio::test]
    async fn test_session_log_file_receives_output() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("logs").join("session.log");
        let factory = MockTransportFactory::new();
        let terminal = Arc::new(MemorySink::new());
        let sink = Arc::new(DualSink::new(
            Arc::new(FileLogSink::open(&path).unwrap()),
            terminal,
        ));
        let router = LineBufferedInputRouter::shared(sink.clone());
        let controller = ConnectionController::new(
            "/dev/ttyACM0",
            57600,
            sink,
            router,
            Arc::new(factory.clone()),
            Arc::new(MonitorSettings::default()),
        );

        controller.open().await.unwrap();
        assert!(factory.emit(TransportEvent::Data(b"temp=21.5\n".to_vec())));
        settle().await;
        controller.stop().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[Starting] Opening the serial port - /dev/ttyACM0"));
        assert!(contents.contains("temp=21.5"));
        assert!(contents.contains("[Done] Closed the serial port"));
    }

    /// Factory whose open never resolves, leaving the session in `Opening`
    #[derive(Default)]
    struct StalledFactory {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl TransportFactory for StalledFactory {
        async fn open(
            &self,
            _options: &OpenOptions,
        ) -> TransportResult<(Arc<dyn SerialTransport>, TransportEvents)> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_input_during_pending_open_is_not_blocked() {
        let factory = Arc::new(StalledFactory::default());
        let terminal = Arc::new(MemorySink::new());
        let sink = Arc::new(DualSink::new(Arc::new(MemorySink::new()), terminal.clone()));
        let router = LineBufferedInputRouter::shared(sink.clone());
        let controller = ConnectionController::new(
            "/dev/ttyUSB0",
            9600,
            sink,
            router.clone(),
            factory.clone(),
            Arc::new(MonitorSettings::default()),
        );

        let opening = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.open().await }
        });
        while factory.attempts.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(controller.state(), ConnectionState::Opening);

        tokio::time::timeout(Duration::from_secs(1), async {
            let mut router = router.lock().await;
            assert!(router.is_attached());
            router.handle_input("x\r").await;
        })
        .await
        .expect("input blocked behind the pending open");

        assert!(terminal.contents().ends_with("x\r\n"));
        assert_eq!(router.lock().await.pending(), "");
        assert_eq!(controller.state(), ConnectionState::Opening);
        assert!(!controller.is_active());
        opening.abort();
    }
}
