//! Reading session position state machine
//!
//! The session owns the displayed position. The external address is read
//! exactly once (`Uninitialized -> Ready`); afterwards changes coming back
//! from the address are ignored, so the session's own debounced write-back
//! can never be re-imported as a new navigation and snap the reader back.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::address::ExternalAddress;
use super::store::NavigationStore;
use crate::canon::BookTable;
use crate::config::NavigationConfig;
use crate::position::{self, ChapterPosition};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the external initial position
    Uninitialized,
    /// Position owned by the session; external changes ignored
    Ready,
}

#[derive(Debug)]
struct Session {
    phase: Phase,
    position: ChapterPosition,
    last_externalized: ChapterPosition,
}

/// Single source of truth for the displayed chapter
pub struct NavigationState {
    books: Arc<BookTable>,
    store: NavigationStore,
    address: Arc<dyn ExternalAddress>,
    debounce: Duration,
    circular: bool,
    session: Arc<Mutex<Session>>,
    /// Pending debounced write, aborted on re-arm and unmount
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl NavigationState {
    /// Create an uninitialized session
    pub fn new(
        books: Arc<BookTable>,
        store: NavigationStore,
        address: Arc<dyn ExternalAddress>,
        config: &NavigationConfig,
    ) -> Self {
        let start = ChapterPosition::start();
        Self {
            books,
            store,
            address,
            debounce: Duration::from_millis(config.debounce_ms),
            circular: config.circular,
            session: Arc::new(Mutex::new(Session {
                phase: Phase::Uninitialized,
                position: start,
                last_externalized: start,
            })),
            timer: Mutex::new(None),
        }
    }

    /// Create a session and initialize it from the external address
    pub fn mount(
        books: Arc<BookTable>,
        store: NavigationStore,
        address: Arc<dyn ExternalAddress>,
        config: &NavigationConfig,
    ) -> Self {
        let state = Self::new(books, store, Arc::clone(&address), config);
        state.apply_external(address.read());
        state
    }

    /// Feed an externally observed address into the session
    ///
    /// Only the first call initializes the session; every later call is
    /// ignored and returns `false`.
    pub fn apply_external(&self, external: Option<ChapterPosition>) -> bool {
        let position = {
            let mut session = self.session.lock();
            if session.phase == Phase::Ready {
                tracing::debug!(?external, "Session ready, ignoring external address");
                return false;
            }

            let initial = external.unwrap_or_default();
            let position = position::clamp(
                i64::from(initial.book_id),
                i64::from(initial.chapter_number),
                &self.books,
            );
            session.phase = Phase::Ready;
            session.position = position;
            // The address already holds this value
            session.last_externalized = external.unwrap_or(position);
            position
        };

        tracing::debug!(%position, "Session initialized");
        self.publish(position);
        true
    }

    /// Move to a chapter
    ///
    /// Out-of-range input is clamped. The position changes immediately; the
    /// external address is written once the user pauses for the debounce
    /// delay.
    pub fn navigate(&self, book_id: i64, chapter_number: i64) -> ChapterPosition {
        let position = position::clamp(book_id, chapter_number, &self.books);
        {
            let mut session = self.session.lock();
            session.phase = Phase::Ready;
            session.position = position;
        }

        self.publish(position);
        self.schedule_externalize();
        position
    }

    /// Move to the following chapter, if any
    pub fn go_next(&self) -> Option<ChapterPosition> {
        let next = position::next_position(self.position(), &self.books, self.circular)?;
        Some(self.navigate(i64::from(next.book_id), i64::from(next.chapter_number)))
    }

    /// Move to the preceding chapter, if any
    pub fn go_previous(&self) -> Option<ChapterPosition> {
        let prev = position::prev_position(self.position(), &self.books, self.circular)?;
        Some(self.navigate(i64::from(prev.book_id), i64::from(prev.chapter_number)))
    }

    /// Jump to an absolute chapter index (pager offset)
    pub fn navigate_to_index(&self, index: u32) -> Option<ChapterPosition> {
        let target = position::from_absolute_index(index, &self.books)?;
        Some(self.navigate(i64::from(target.book_id), i64::from(target.chapter_number)))
    }

    pub fn position(&self) -> ChapterPosition {
        self.session.lock().position
    }

    pub fn phase(&self) -> Phase {
        self.session.lock().phase
    }

    pub fn absolute_index(&self) -> Option<u32> {
        position::to_absolute_index(self.position(), &self.books)
    }

    pub fn can_go_next(&self) -> bool {
        position::can_go_next(self.position(), &self.books, self.circular)
    }

    pub fn can_go_previous(&self) -> bool {
        position::can_go_previous(self.position(), &self.books, self.circular)
    }

    /// Write any pending position now instead of waiting for the timer
    pub fn flush(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
        externalize(&self.session, self.address.as_ref());
    }

    /// Tear down the session, cancelling a pending write
    pub fn unmount(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
    }

    fn publish(&self, position: ChapterPosition) {
        let name = self.books.name(position.book_id).unwrap_or_default();
        self.store
            .set_position(position.book_id, position.chapter_number, name);
    }

    fn schedule_externalize(&self) {
        let mut timer = self.timer.lock();
        if let Some(previous) = timer.take() {
            previous.abort();
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime for debounced address write, writing now");
            drop(timer);
            externalize(&self.session, self.address.as_ref());
            return;
        };

        let session = Arc::clone(&self.session);
        let address = Arc::clone(&self.address);
        let delay = self.debounce;
        *timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            externalize(&session, address.as_ref());
        }));
    }
}

impl Drop for NavigationState {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn externalize(session: &Mutex<Session>, address: &dyn ExternalAddress) {
    let position = {
        let mut session = session.lock();
        if session.position == session.last_externalized {
            return;
        }
        session.last_externalized = session.position;
        session.position
    };

    // The address may block on I/O; the session lock is already released
    address.write(position);
    tracing::debug!(%position, "External address updated");
}
