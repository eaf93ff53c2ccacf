//! 재연결 감시 엔진 -- 종류별 구독 유지와 핸들러 전달
//!
//! [`ReconnectingWatch`]는 감시 대상 종류마다 하나씩 실행됩니다.
//!
//! ```text
//! Disconnected ──subscribe──> Connecting ──ok──> Connected
//!      ^                          │                  │
//!      └──── retry_interval ──────┴─── stream end ───┘
//! ```
//!
//! - 구독 실패와 스트림 종료는 모두 `Disconnected`로 취급하고 고정 백오프 후 재시도합니다.
//! - 이벤트는 용량 1 채널로 종류별 핸들러 태스크에 전달됩니다. 핸들러가 느리면
//!   해당 종류의 수신만 멈추고 다른 종류에는 영향이 없습니다.
//! - 핸들러 에러는 로그와 메트릭으로만 남기며 구독을 닫지 않습니다.
//! - 종료는 `CancellationToken`으로만 이루어집니다.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ironwatch_core::event::WatchEvent;
use ironwatch_core::metrics as m;

use crate::error::WatcherError;

/// 구독이 내보내는 이벤트 스트림
pub type EventStream<T> = BoxStream<'static, Result<WatchEvent<T>, WatcherError>>;

/// 구독 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// 종류별 연결 상태 게시판
///
/// 엔진이 상태를 기록하고, 헬스 체크가 읽습니다.
#[derive(Debug, Clone, Default)]
pub struct ConnectionBoard {
    states: Arc<RwLock<BTreeMap<&'static str, ConnectionState>>>,
}

impl ConnectionBoard {
    /// 빈 게시판을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 종류의 상태를 기록합니다.
    pub fn set(&self, kind: &'static str, state: ConnectionState) {
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, state);
    }

    /// 종류의 상태를 반환합니다. 기록이 없으면 `Disconnected`.
    pub fn get(&self, kind: &str) -> ConnectionState {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .copied()
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// 연결되지 않은 종류 목록
    pub fn disconnected(&self) -> Vec<&'static str> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, state)| **state != ConnectionState::Connected)
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// 전체 상태 사본
    pub fn snapshot(&self) -> BTreeMap<&'static str, ConnectionState> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// 재연결 가능한 구독 원천
pub trait WatchSource: Send + Sync + 'static {
    /// 스트림이 내보내는 객체 타입
    type Object: Send + 'static;

    /// 로그/메트릭 레이블용 종류 이름
    fn kind(&self) -> &'static str;

    /// 새 구독을 엽니다. 일시적으로 실패할 수 있습니다.
    fn subscribe(
        &self,
    ) -> impl Future<Output = Result<EventStream<Self::Object>, WatcherError>> + Send;

    /// 재구독 직전에 호출됩니다 (첫 구독 제외).
    fn before_resubscribe(&self) -> impl Future<Output = Result<(), WatcherError>> + Send {
        async { Ok(()) }
    }
}

/// 종류별 이벤트 핸들러
pub trait EventHandler<T>: Send + Sync + 'static {
    /// 이벤트 하나를 처리합니다. 에러는 치명적이지 않습니다.
    fn handle(&self, event: WatchEvent<T>) -> impl Future<Output = Result<(), WatcherError>> + Send;
}

/// 스트림 전달 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForwardOutcome {
    /// 스트림이 닫히거나 에러를 냄 → 재구독
    Closed,
    /// 취소 신호
    Cancelled,
    /// 핸들러 태스크가 사라짐
    HandlerGone,
}

/// 취소되지 않으면 `duration`만큼 잠들고 `true`, 취소되면 `false`를 반환합니다.
pub(crate) async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// 재연결 감시 엔진
pub struct ReconnectingWatch<S, H> {
    source: S,
    handler: Arc<H>,
    retry_interval: Duration,
    board: ConnectionBoard,
    cancel: CancellationToken,
}

impl<S, H> ReconnectingWatch<S, H>
where
    S: WatchSource,
    H: EventHandler<S::Object>,
{
    /// 새 엔진을 생성합니다.
    pub fn new(
        source: S,
        handler: Arc<H>,
        retry_interval: Duration,
        board: ConnectionBoard,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            handler,
            retry_interval,
            board,
            cancel,
        }
    }

    /// 취소될 때까지 구독을 유지합니다.
    pub async fn run(self) {
        let kind = self.source.kind();
        self.board.set(kind, ConnectionState::Disconnected);

        let (event_tx, event_rx) = mpsc::channel(1);
        let handler_task = tokio::spawn(run_handler(
            kind,
            Arc::clone(&self.handler),
            event_rx,
            self.cancel.clone(),
        ));

        let mut first_attempt = true;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.board.set(kind, ConnectionState::Connecting);
            if !first_attempt {
                metrics::counter!(m::WATCHER_RECONNECTS_TOTAL, m::LABEL_KIND => kind).increment(1);
                if let Err(e) = self.source.before_resubscribe().await {
                    warn!(kind, error = %e, "failed to prepare resubscription");
                    self.board.set(kind, ConnectionState::Disconnected);
                    if !sleep_or_cancel(&self.cancel, self.retry_interval).await {
                        break;
                    }
                    continue;
                }
            }
            first_attempt = false;

            match self.source.subscribe().await {
                Ok(stream) => {
                    self.board.set(kind, ConnectionState::Connected);
                    info!(kind, "watch subscription established");

                    match self.forward(kind, stream, &event_tx).await {
                        ForwardOutcome::Cancelled => break,
                        ForwardOutcome::HandlerGone => {
                            warn!(kind, "event handler stopped, ending watch");
                            break;
                        }
                        ForwardOutcome::Closed => {
                            self.board.set(kind, ConnectionState::Disconnected);
                            warn!(kind, "watch stream closed, resubscribing after backoff");
                        }
                    }
                }
                Err(e) => {
                    self.board.set(kind, ConnectionState::Disconnected);
                    warn!(kind, error = %e, "failed to open watch subscription");
                }
            }

            if !sleep_or_cancel(&self.cancel, self.retry_interval).await {
                break;
            }
        }

        self.board.set(kind, ConnectionState::Disconnected);
        drop(event_tx);
        if let Err(e) = handler_task.await {
            warn!(kind, error = %e, "event handler task ended abnormally");
        }
        debug!(kind, "watch loop stopped");
    }

    async fn forward(
        &self,
        kind: &'static str,
        mut stream: EventStream<S::Object>,
        event_tx: &mpsc::Sender<WatchEvent<S::Object>>,
    ) -> ForwardOutcome {
        loop {
            let item = tokio::select! {
                _ = self.cancel.cancelled() => return ForwardOutcome::Cancelled,
                item = stream.next() => item,
            };

            match item {
                Some(Ok(event)) => {
                    metrics::counter!(m::WATCHER_EVENTS_TOTAL, m::LABEL_KIND => kind).increment(1);
                    tokio::select! {
                        _ = self.cancel.cancelled() => return ForwardOutcome::Cancelled,
                        sent = event_tx.send(event) => {
                            if sent.is_err() {
                                return ForwardOutcome::HandlerGone;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(kind, error = %e, "watch stream reported an error");
                    return ForwardOutcome::Closed;
                }
                None => return ForwardOutcome::Closed,
            }
        }
    }
}

/// 종류별 핸들러 태스크 -- 수신 순서대로 하나씩 처리합니다.
async fn run_handler<T, H>(
    kind: &'static str,
    handler: Arc<H>,
    mut event_rx: mpsc::Receiver<WatchEvent<T>>,
    cancel: CancellationToken,
) where
    T: Send + 'static,
    H: EventHandler<T>,
{
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = event_rx.recv() => event,
        };
        let Some(event) = event else {
            break;
        };

        let event_type = event.event_type;
        if let Err(e) = handler.handle(event).await {
            metrics::counter!(m::WATCHER_HANDLER_ERRORS_TOTAL, m::LABEL_KIND => kind).increment(1);
            warn!(kind, event_type = %event_type, error = %e, "event handler reported an error");
        }
    }
}
