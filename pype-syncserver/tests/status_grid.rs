use rstest::rstest;

use pype_syncserver::{derive, SideState, SyncStatus};

const MAX_TRIES: u32 = 3;

fn side(paused: bool, failed: bool, progress: f64) -> SideState {
    SideState {
        progress,
        paused,
        failed: false,
        tries: if failed { MAX_TRIES } else { 0 },
    }
}

fn in_flight(progress: f64) -> bool {
    progress > 0.0 && progress < 1.0
}

#[rstest]
fn status_follows_precedence(
    #[values(false, true)] local_paused: bool,
    #[values(false, true)] remote_paused: bool,
    #[values(false, true)] local_failed: bool,
    #[values(false, true)] remote_failed: bool,
    #[values(0.0, 0.5, 1.0)] local_progress: f64,
    #[values(0.0, 0.5, 1.0)] remote_progress: f64,
) {
    let local = side(local_paused, local_failed, local_progress);
    let remote = side(remote_paused, remote_failed, remote_progress);

    let expected = if local_paused || remote_paused {
        SyncStatus::Paused
    } else if local_failed || remote_failed {
        SyncStatus::Failed
    } else if local_progress == 0.0 || remote_progress == 0.0 {
        SyncStatus::Queued
    } else if in_flight(local_progress) || in_flight(remote_progress) {
        SyncStatus::InProgress
    } else {
        SyncStatus::SyncedOk
    };
    assert_eq!(derive(&local, &remote, MAX_TRIES), expected);
    assert_eq!(derive(&remote, &local, MAX_TRIES), expected);
}

#[rstest]
#[case(2, false, SyncStatus::InProgress)]
#[case(3, false, SyncStatus::Failed)]
#[case(0, true, SyncStatus::Failed)]
fn failure_by_tries_or_flag(#[case] tries: u32, #[case] failed: bool, #[case] expected: SyncStatus) {
    let local = SideState {
        progress: 1.0,
        ..SideState::default()
    };
    let remote = SideState {
        progress: 0.5,
        failed,
        tries,
        ..SideState::default()
    };
    assert_eq!(derive(&local, &remote, MAX_TRIES), expected);
}

#[test]
fn paused_wins_over_queued() {
    let queued = side(false, false, 0.0);
    let paused = side(true, false, 0.0);
    assert_eq!(derive(&queued, &paused, MAX_TRIES), SyncStatus::Paused);
}
