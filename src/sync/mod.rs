//! Engine state synchronizer.
//!
//! Keeps a GTP engine's board in step with a local [`PositionSource`] by
//! remembering which moves the engine has confirmed and sending only the
//! difference: undo back to the longest common prefix, then replay the rest.
//!
//! # Bookkeeping
//!
//! The peer record is only changed after the engine confirmed a command, so
//! after a failure it still reflects what the engine really holds. Undo is
//! fully confirmed before any replay command is sent.
//!
//! ```text
//! peer:     B D4  W Q16  B Q4
//! desired:  B D4  W Q16  B C16  W D16
//!           |-- prefix --|
//! => undo 1, replay [B C16, W D16]
//! ```

pub mod plan;

pub use plan::{common_prefix_len, Plan};

use crate::config::SyncOptions;
use crate::error::{Result, SyncError};
use crate::game::{Komi, Move, PositionSource};
use crate::gtp::protocol::Command;
use crate::gtp::transport::{Capabilities, GtpTransport};

/// Called with the engine's move count after each confirmed move or undo.
pub type ProgressCallback = Box<dyn FnMut(usize) + Send>;

pub struct Synchronizer<T> {
    transport: T,
    capabilities: Capabilities,
    options: SyncOptions,
    peer_moves: Vec<Move>,
    /// `None` until `boardsize` and `clear_board` both succeeded.
    peer_size: Option<usize>,
    peer_komi: Option<Komi>,
    out_of_sync: bool,
    progress: Option<ProgressCallback>,
}

impl<T: GtpTransport> Synchronizer<T> {
    pub fn new(transport: T) -> Self {
        Self::with_options(transport, SyncOptions::default())
    }

    pub fn with_options(transport: T, options: SyncOptions) -> Self {
        let capabilities = transport.capabilities();
        Self {
            transport,
            capabilities,
            options,
            peer_moves: Vec::new(),
            peer_size: None,
            peer_komi: None,
            out_of_sync: false,
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: impl FnMut(usize) + Send + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Reset the engine to `position`: board size, clear, komi, every move.
    pub async fn init<P: PositionSource + ?Sized>(&mut self, position: &P) -> Result<()> {
        self.out_of_sync = true;
        let desired = position.moves();
        check_on_board(position.size(), &desired)?;
        self.reset(position.size(), position.komi(), &desired).await?;
        self.out_of_sync = false;
        Ok(())
    }

    /// Bring the engine to `position` with as few commands as possible.
    ///
    /// A board size change falls back to a full [`init`](Self::init). On
    /// error the synchronizer stays out of sync until a later call succeeds.
    pub async fn synchronize<P: PositionSource + ?Sized>(&mut self, position: &P) -> Result<()> {
        self.out_of_sync = true;
        let size = position.size();
        let desired = position.moves();
        check_on_board(size, &desired)?;

        if self.peer_size != Some(size) {
            self.reset(size, position.komi(), &desired).await?;
        } else {
            self.send_komi(position.komi()).await?;

            let plan = Plan::compute(&self.peer_moves, &desired);
            tracing::debug!(
                "Synchronizing: prefix {}, undo {}, replay {}",
                plan.prefix_len,
                plan.undo_count,
                plan.replay.len()
            );

            self.undo(plan.undo_count).await?;
            self.execute(plan.replay).await?;
        }

        self.out_of_sync = false;
        Ok(())
    }

    /// Record the move the engine itself just generated and played.
    ///
    /// `position` must equal the current peer record plus exactly one move.
    /// No command is sent.
    pub fn update_after_genmove<P: PositionSource + ?Sized>(&mut self, position: &P) {
        let count = position.move_count();
        debug_assert_eq!(
            self.peer_moves.len() + 1,
            count,
            "genmove update must add exactly one move"
        );
        debug_assert!(
            self.peer_moves
                .iter()
                .enumerate()
                .all(|(i, mv)| *mv == position.move_at(i)),
            "genmove update on a diverged position"
        );

        if let Some(last) = count.checked_sub(1) {
            self.peer_moves.push(position.move_at(last));
        }
    }

    /// Whether the last `init`/`synchronize` did not complete.
    ///
    /// Before the first `init` there is nothing to be out of sync with, so
    /// this reports `false`.
    pub fn is_out_of_sync(&self) -> bool {
        self.out_of_sync
    }

    /// Moves the engine is known to hold. Not trustworthy while out of sync.
    pub fn peer_moves(&self) -> &[Move] {
        &self.peer_moves
    }

    pub fn peer_board_size(&self) -> Option<usize> {
        self.peer_size
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Direct access for caller-issued commands such as `genmove`.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    async fn reset(&mut self, size: usize, komi: Option<Komi>, desired: &[Move]) -> Result<()> {
        tracing::debug!("Full reset: size {}, {} moves", size, desired.len());

        self.peer_size = None;
        self.peer_komi = None;
        self.peer_moves.clear();

        self.send(&Command::boardsize(size)).await?;
        self.send(&Command::clear_board()).await?;
        self.peer_size = Some(size);

        self.send_komi(komi).await?;
        self.execute(desired).await
    }

    async fn send_komi(&mut self, komi: Option<Komi>) -> Result<()> {
        let Some(komi) = komi else {
            return Ok(());
        };
        // komi is optional for synchronization; engines without it are skipped.
        if self.peer_komi == Some(komi) || !self.capabilities.contains(Capabilities::KOMI) {
            return Ok(());
        }

        self.send(&Command::komi(komi)).await?;
        self.peer_komi = Some(komi);
        Ok(())
    }

    async fn undo(&mut self, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }

        if count > 1 && self.options.batch_undo && self.capabilities.contains(Capabilities::GG_UNDO)
        {
            self.send(&Command::gg_undo(count)).await?;
            let keep = self.peer_moves.len() - count;
            self.peer_moves.truncate(keep);
            self.notify();
            return Ok(());
        }

        let step = if self.capabilities.contains(Capabilities::UNDO) {
            Command::undo()
        } else if self.capabilities.contains(Capabilities::GG_UNDO) {
            Command::gg_undo(1)
        } else {
            return Err(SyncError::UndoNotSupported);
        };

        for _ in 0..count {
            self.send(&step).await?;
            self.peer_moves.pop();
            self.notify();
        }

        Ok(())
    }

    async fn execute(&mut self, moves: &[Move]) -> Result<()> {
        if moves.len() > 1 && self.options.batch_play {
            if let Some(name) = self.capabilities.play_sequence_command() {
                self.send(&Command::play_sequence(name, moves)).await?;
                self.peer_moves.extend_from_slice(moves);
                self.notify();
                return Ok(());
            }
        }

        for mv in moves {
            self.send(&Command::play(mv)).await?;
            self.peer_moves.push(*mv);
            self.notify();
        }

        Ok(())
    }

    async fn send(&mut self, command: &Command) -> Result<String> {
        self.transport.send(&command.to_string()).await
    }

    fn notify(&mut self) {
        let len = self.peer_moves.len();
        if let Some(callback) = self.progress.as_mut() {
            callback(len);
        }
    }
}

/// Reject moves the engine could not address before any command goes out.
fn check_on_board(size: usize, moves: &[Move]) -> Result<()> {
    let off_board = moves
        .iter()
        .find(|mv| mv.point.is_some_and(|p| !p.is_on_board(size)));

    match off_board {
        Some(mv) => Err(SyncError::InvalidMove(format!(
            "{} is off a {}x{} board",
            mv, size, size
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Color, Position};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    /// Records every command; fails the command with the given index.
    struct FakeEngine {
        supported: HashSet<&'static str>,
        sent: Vec<String>,
        fail_at: Option<usize>,
    }

    impl FakeEngine {
        fn new(supported: &[&'static str]) -> Self {
            Self {
                supported: supported.iter().copied().collect(),
                sent: Vec::new(),
                fail_at: None,
            }
        }

        fn fail_at(mut self, index: usize) -> Self {
            self.fail_at = Some(index);
            self
        }
    }

    #[async_trait]
    impl GtpTransport for FakeEngine {
        async fn send(&mut self, command: &str) -> Result<String> {
            let index = self.sent.len();
            self.sent.push(command.to_string());
            if self.fail_at == Some(index) {
                return Err(SyncError::Command {
                    command: command.to_string(),
                    message: "scripted failure".to_string(),
                });
            }
            Ok(String::new())
        }

        fn is_supported(&self, name: &str) -> bool {
            self.supported.contains(name)
        }
    }

    fn pos(size: usize, texts: &[&str]) -> Position {
        Position::from_texts(size, texts).unwrap()
    }

    /// Drop the commands sent so far.
    fn clear(sync: &mut Synchronizer<FakeEngine>) {
        sync.transport_mut().sent.clear();
        sync.transport_mut().fail_at = None;
    }

    fn sent(sync: &Synchronizer<FakeEngine>) -> Vec<&str> {
        sync.transport().sent.iter().map(String::as_str).collect()
    }

    #[tokio::test]
    async fn test_init_replays_everything() {
        let mut sync = Synchronizer::new(FakeEngine::new(&[]));
        sync.init(&pos(19, &["B D4", "W Q16"])).await.unwrap();

        assert_eq!(
            sent(&sync),
            vec!["boardsize 19", "clear_board", "play b D4", "play w Q16"]
        );
        assert_eq!(sync.peer_moves().len(), 2);
        assert_eq!(sync.peer_board_size(), Some(19));
        assert!(!sync.is_out_of_sync());
    }

    #[tokio::test]
    async fn test_init_uses_play_sequence() {
        let mut sync = Synchronizer::new(FakeEngine::new(&["gogui-play_sequence"]));
        sync.init(&pos(9, &["B E5", "W pass"])).await.unwrap();

        assert_eq!(
            sent(&sync),
            vec!["boardsize 9", "clear_board", "gogui-play_sequence b E5 w pass"]
        );
    }

    #[tokio::test]
    async fn test_single_move_never_batched() {
        let mut sync = Synchronizer::new(FakeEngine::new(&["play_sequence"]));
        sync.init(&pos(9, &["B E5"])).await.unwrap();
        assert_eq!(sent(&sync)[2], "play b E5");
    }

    #[tokio::test]
    async fn test_not_out_of_sync_before_init() {
        let sync = Synchronizer::new(FakeEngine::new(&[]));
        assert!(!sync.is_out_of_sync());
        assert_eq!(sync.peer_board_size(), None);
    }

    #[tokio::test]
    async fn test_divergent_branch_with_play_sequence() {
        let mut sync = Synchronizer::new(FakeEngine::new(&["undo", "gogui-play_sequence"]));
        sync.init(&pos(19, &["B D4", "W Q16", "B Q4"])).await.unwrap();
        clear(&mut sync);

        let desired = pos(19, &["B D4", "W Q16", "B C16", "W D16"]);
        sync.synchronize(&desired).await.unwrap();

        assert_eq!(sent(&sync), vec!["undo", "gogui-play_sequence b C16 w D16"]);
        assert_eq!(sync.peer_moves(), desired.as_slice());
        assert!(!sync.is_out_of_sync());
    }

    #[tokio::test]
    async fn test_divergent_branch_single_plays() {
        let mut sync = Synchronizer::new(FakeEngine::new(&["undo"]));
        sync.init(&pos(19, &["B D4", "W Q16", "B Q4"])).await.unwrap();
        clear(&mut sync);

        let desired = pos(19, &["B D4", "W Q16", "B C16", "W D16"]);
        sync.synchronize(&desired).await.unwrap();

        assert_eq!(sent(&sync), vec!["undo", "play b C16", "play w D16"]);
        assert_eq!(sync.peer_moves(), desired.as_slice());
    }

    #[tokio::test]
    async fn test_noop_and_idempotent() {
        let mut sync = Synchronizer::new(FakeEngine::new(&["undo"]));
        let desired = pos(19, &["B D4", "W Q16"]);
        sync.init(&desired).await.unwrap();
        clear(&mut sync);

        sync.synchronize(&desired).await.unwrap();
        sync.synchronize(&desired).await.unwrap();

        assert!(sent(&sync).is_empty());
        assert!(!sync.is_out_of_sync());
    }

    #[tokio::test]
    async fn test_new_tip_move_only_plays() {
        let mut sync = Synchronizer::new(FakeEngine::new(&[]));
        let mut desired = pos(19, &["B D4"]);
        sync.init(&desired).await.unwrap();
        clear(&mut sync);

        desired.play(Move::parse("W Q16", 19).unwrap());
        sync.synchronize(&desired).await.unwrap();

        assert_eq!(sent(&sync), vec!["play w Q16"]);
    }

    #[tokio::test]
    async fn test_batch_undo_for_several_moves() {
        let mut sync = Synchronizer::new(FakeEngine::new(&["undo", "gg-undo"]));
        sync.init(&pos(19, &["B D4", "W Q16", "B Q4", "W D16"])).await.unwrap();
        clear(&mut sync);

        sync.synchronize(&pos(19, &["B D4"])).await.unwrap();

        assert_eq!(sent(&sync), vec!["gg-undo 3"]);
        assert_eq!(sync.peer_moves().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_undo_disabled() {
        let options = SyncOptions {
            batch_undo: false,
            batch_play: true,
        };
        let mut sync = Synchronizer::with_options(FakeEngine::new(&["undo", "gg-undo"]), options);
        sync.init(&pos(19, &["B D4", "W Q16", "B Q4"])).await.unwrap();
        clear(&mut sync);

        sync.synchronize(&pos(19, &["B D4"])).await.unwrap();
        assert_eq!(sent(&sync), vec!["undo", "undo"]);
    }

    #[tokio::test]
    async fn test_single_undo_prefers_plain_undo() {
        let mut sync = Synchronizer::new(FakeEngine::new(&["undo", "gg-undo"]));
        sync.init(&pos(19, &["B D4", "W Q16"])).await.unwrap();
        clear(&mut sync);

        sync.synchronize(&pos(19, &["B D4"])).await.unwrap();
        assert_eq!(sent(&sync), vec!["undo"]);
    }

    #[tokio::test]
    async fn test_undo_not_supported() {
        let mut sync = Synchronizer::new(FakeEngine::new(&[]));
        sync.init(&pos(19, &["B D4", "W Q16"])).await.unwrap();
        clear(&mut sync);

        let err = sync.synchronize(&pos(19, &["B D4"])).await.unwrap_err();

        assert!(matches!(err, SyncError::UndoNotSupported));
        assert!(sent(&sync).is_empty());
        assert!(sync.is_out_of_sync());
        assert_eq!(sync.peer_moves().len(), 2);
    }

    #[tokio::test]
    async fn test_partial_undo_failure_keeps_confirmed_undos() {
        let mut sync = Synchronizer::new(FakeEngine::new(&["undo"]));
        sync.init(&pos(19, &["B D4", "W Q16", "B Q4", "W D16"])).await.unwrap();
        clear(&mut sync);
        sync.transport_mut().fail_at = Some(2);

        let err = sync.synchronize(&pos(19, &["B D4"])).await.unwrap_err();

        assert!(err.is_transport());
        assert_eq!(sent(&sync), vec!["undo", "undo", "undo"]);
        assert_eq!(sync.peer_moves(), pos(19, &["B D4", "W Q16"]).as_slice());
        assert!(sync.is_out_of_sync());
    }

    #[tokio::test]
    async fn test_replay_failure_then_recovery() {
        let mut sync = Synchronizer::new(FakeEngine::new(&["undo"]));
        sync.init(&pos(19, &[])).await.unwrap();
        clear(&mut sync);
        sync.transport_mut().fail_at = Some(1);

        let desired = pos(19, &["B D4", "W Q16", "B Q4"]);
        assert!(sync.synchronize(&desired).await.is_err());
        assert_eq!(sync.peer_moves(), pos(19, &["B D4"]).as_slice());
        assert!(sync.is_out_of_sync());

        clear(&mut sync);
        sync.synchronize(&desired).await.unwrap();
        assert_eq!(sent(&sync), vec!["play w Q16", "play b Q4"]);
        assert!(!sync.is_out_of_sync());
    }

    #[tokio::test]
    async fn test_size_change_resets() {
        let mut sync = Synchronizer::new(FakeEngine::new(&["undo"]));
        sync.init(&pos(19, &["B D4"])).await.unwrap();
        clear(&mut sync);

        sync.synchronize(&pos(9, &["B D4", "W E5"])).await.unwrap();

        assert_eq!(
            sent(&sync),
            vec!["boardsize 9", "clear_board", "play b D4", "play w E5"]
        );
        assert_eq!(sync.peer_board_size(), Some(9));
    }

    #[tokio::test]
    async fn test_failed_init_forces_reset() {
        let engine = FakeEngine::new(&["undo"]).fail_at(1);
        let mut sync = Synchronizer::new(engine);
        let desired = pos(19, &["B D4"]);

        assert!(sync.init(&desired).await.is_err());
        assert!(sync.is_out_of_sync());
        assert_eq!(sync.peer_board_size(), None);

        clear(&mut sync);
        sync.synchronize(&desired).await.unwrap();
        assert_eq!(sent(&sync), vec!["boardsize 19", "clear_board", "play b D4"]);
    }

    #[tokio::test]
    async fn test_komi_sent_once() {
        let mut sync = Synchronizer::new(FakeEngine::new(&["komi"]));
        let desired = pos(19, &[]).with_komi(Komi(6.5));
        sync.init(&desired).await.unwrap();
        assert_eq!(sent(&sync), vec!["boardsize 19", "clear_board", "komi 6.5"]);

        clear(&mut sync);
        sync.synchronize(&desired).await.unwrap();
        assert!(sent(&sync).is_empty());

        let changed = pos(19, &[]).with_komi(Komi(0.5));
        sync.synchronize(&changed).await.unwrap();
        assert_eq!(sent(&sync), vec!["komi 0.5"]);
    }

    #[tokio::test]
    async fn test_komi_skipped_without_support() {
        let mut sync = Synchronizer::new(FakeEngine::new(&[]));
        sync.init(&pos(19, &[]).with_komi(Komi(7.5))).await.unwrap();
        assert_eq!(sent(&sync), vec!["boardsize 19", "clear_board"]);
    }

    #[tokio::test]
    async fn test_update_after_genmove() {
        let mut sync = Synchronizer::new(FakeEngine::new(&[]));
        let mut desired = pos(19, &["B D4"]);
        sync.init(&desired).await.unwrap();
        clear(&mut sync);

        desired.play(Move::play(Color::White, crate::game::Point::new(15, 15)));
        sync.update_after_genmove(&desired);

        assert!(sent(&sync).is_empty());
        assert_eq!(sync.peer_moves(), desired.as_slice());
        assert!(!sync.is_out_of_sync());
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    #[should_panic(expected = "exactly one move")]
    async fn test_update_after_genmove_precondition() {
        let mut sync = Synchronizer::new(FakeEngine::new(&[]));
        sync.init(&pos(19, &[])).await.unwrap();
        sync.update_after_genmove(&pos(19, &["B D4", "W Q16"]));
    }

    #[tokio::test]
    async fn test_progress_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let mut sync = Synchronizer::new(FakeEngine::new(&["undo"]))
            .with_progress(move |n| record.lock().unwrap().push(n));

        sync.init(&pos(19, &["B D4", "W Q16"])).await.unwrap();
        sync.synchronize(&pos(19, &["B D4"])).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 1]);
    }

    #[tokio::test]
    async fn test_progress_callback_after_batches() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let engine = FakeEngine::new(&["gg-undo", "gogui-play_sequence"]);
        let mut sync =
            Synchronizer::new(engine).with_progress(move |n| record.lock().unwrap().push(n));

        let three = pos(19, &["B D4", "W Q16", "B Q4"]);
        sync.init(&three).await.unwrap();
        sync.synchronize(&pos(19, &["B D4"])).await.unwrap();
        sync.synchronize(&three).await.unwrap();
        sync.synchronize(&pos(19, &["B D4", "W Q16"])).await.unwrap();

        assert_eq!(
            sent(&sync)[2..],
            [
                "gogui-play_sequence b D4 w Q16 b Q4",
                "gg-undo 2",
                "gogui-play_sequence w Q16 b Q4",
                "gg-undo 1",
            ]
        );
        // One report per batch command, one per single step.
        assert_eq!(*seen.lock().unwrap(), vec![3, 1, 3, 2]);
    }

    #[tokio::test]
    async fn test_failed_batch_undo_keeps_record() {
        let mut sync = Synchronizer::new(FakeEngine::new(&["gg-undo"]));
        let before = pos(19, &["B D4", "W Q16", "B Q4", "W D16"]);
        sync.init(&before).await.unwrap();
        clear(&mut sync);
        sync.transport_mut().fail_at = Some(0);

        let result = sync.synchronize(&pos(19, &["B D4"])).await;

        assert!(matches!(result, Err(SyncError::Command { .. })));
        assert_eq!(sent(&sync), vec!["gg-undo 3"]);
        assert_eq!(sync.peer_moves(), before.as_slice());
        assert!(sync.is_out_of_sync());
    }

    #[tokio::test]
    async fn test_failed_play_sequence_appends_nothing() {
        let mut sync = Synchronizer::new(FakeEngine::new(&["gogui-play_sequence"]));
        let start = pos(19, &["B D4"]);
        sync.init(&start).await.unwrap();
        clear(&mut sync);
        sync.transport_mut().fail_at = Some(0);

        let desired = pos(19, &["B D4", "W Q16", "B Q4"]);
        let result = sync.synchronize(&desired).await;

        assert!(matches!(result, Err(SyncError::Command { .. })));
        assert_eq!(sent(&sync), vec!["gogui-play_sequence w Q16 b Q4"]);
        assert_eq!(sync.peer_moves(), start.as_slice());
        assert!(sync.is_out_of_sync());

        clear(&mut sync);
        sync.synchronize(&desired).await.unwrap();
        assert_eq!(sent(&sync), vec!["gogui-play_sequence w Q16 b Q4"]);
        assert!(!sync.is_out_of_sync());
    }

    #[tokio::test]
    async fn test_off_board_move_rejected_before_sending() {
        let mut sync = Synchronizer::new(FakeEngine::new(&["undo", "gogui-play_sequence"]));
        let far = Move::play(Color::Black, crate::game::Point::new(30, 0));

        let result = sync.init(&Position::new(19).with_moves([far])).await;
        assert!(matches!(result, Err(SyncError::InvalidMove(_))));
        assert!(sent(&sync).is_empty());
        assert!(sync.is_out_of_sync());

        sync.init(&pos(19, &["B D4", "W Q16"])).await.unwrap();
        clear(&mut sync);

        let branch = pos(19, &["B D4"]).with_moves([Move::play(
            Color::White,
            crate::game::Point::new(3, 19),
        )]);
        let result = sync.synchronize(&branch).await;
        assert!(matches!(result, Err(SyncError::InvalidMove(_))));
        assert!(sent(&sync).is_empty());
        assert_eq!(sync.peer_moves(), pos(19, &["B D4", "W Q16"]).as_slice());
    }
}
