// Integration tests for `ModeController` guards, hooks and history.
#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use common::{Recorder, ScriptedProbe, changed_count, monitor};
use vigil_core::{
    ConnectivityMonitor, EnterCheck, EnterContext, EnterReason, ExitContext, HookError, HookPhase,
    Mode, ModeController, ModeEvent, ModeHandler, ModePolicy, ModePolicyTable, OfflinePolicy,
    SwitchError, SwitchOptions, SwitchOutcome,
};

// ── Fixtures ────────────────────────────────────────────────────────

/// Records hook calls and optionally fails one phase.
#[derive(Default)]
struct Tracker {
    log: Arc<Mutex<Vec<String>>>,
    fail_enter: bool,
    fail_exit: bool,
}

impl Tracker {
    fn shared(log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            log: Arc::clone(log),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ModeHandler for Tracker {
    async fn on_enter(&self, ctx: EnterContext) -> Result<(), HookError> {
        self.log
            .lock()
            .push(format!("enter {} from {}", ctx.mode, ctx.prev_mode));
        if self.fail_enter {
            return Err("enter refused".into());
        }
        Ok(())
    }

    async fn on_exit(&self, ctx: ExitContext) -> Result<(), HookError> {
        self.log
            .lock()
            .push(format!("exit {} to {}", ctx.mode, ctx.next_mode));
        if self.fail_exit {
            return Err(HookError::new("exit refused"));
        }
        Ok(())
    }

    fn on_update(&self, payload: &Value) {
        self.log.lock().push(format!("update {payload}"));
    }
}

fn online_monitor() -> ConnectivityMonitor {
    let monitor = monitor(ScriptedProbe::new(vec![]));
    monitor.force_online();
    monitor
}

fn controller() -> (ModeController, ConnectivityMonitor) {
    let monitor = online_monitor();
    (
        ModeController::new(ModePolicyTable::default(), monitor.clone()),
        monitor,
    )
}

// ── Basic switching ─────────────────────────────────────────────────

#[tokio::test]
async fn test_starts_in_default_mode() {
    let (modes, _) = controller();
    let state = modes.state();
    assert_eq!(state.current, Mode::MainViewer);
    assert_eq!(state.previous, None);
    assert!(state.stack.is_empty());
    assert!(!state.locked);
}

#[tokio::test]
async fn test_switch_runs_hooks_and_emits_in_order() {
    let (modes, _) = controller();
    let log = Arc::new(Mutex::new(Vec::new()));
    modes.register_handler(Mode::MainViewer, Arc::new(Tracker::shared(&log)));
    modes.register_handler(Mode::Analytics, Arc::new(Tracker::shared(&log)));
    let rec = Recorder::attach(modes.events());

    let outcome = modes
        .switch_mode(Mode::Analytics, SwitchOptions::default())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SwitchOutcome::Changed {
            from: Mode::MainViewer,
            to: Mode::Analytics,
        }
    );
    assert_eq!(
        *log.lock(),
        vec![
            "exit main-viewer to analytics".to_string(),
            "enter analytics from main-viewer".to_string(),
        ]
    );
    assert_eq!(
        rec.events(),
        vec![
            ModeEvent::BeforeChange {
                from: Mode::MainViewer,
                to: Mode::Analytics,
                options: SwitchOptions::default(),
            },
            ModeEvent::Changed {
                from: Mode::MainViewer,
                to: Mode::Analytics,
                options: SwitchOptions::default(),
            },
        ]
    );
    assert_eq!(modes.previous_mode(), Some(Mode::MainViewer));
}

#[tokio::test]
async fn test_same_mode_switch_is_silent_success() {
    let (modes, _) = controller();
    let log = Arc::new(Mutex::new(Vec::new()));
    modes.register_handler(Mode::MainViewer, Arc::new(Tracker::shared(&log)));
    let rec = Recorder::attach(modes.events());

    let outcome = modes
        .switch_mode(Mode::MainViewer, SwitchOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, SwitchOutcome::Unchanged);
    assert!(log.lock().is_empty());
    assert!(rec.events().is_empty());
}

#[tokio::test]
async fn test_forced_same_mode_switch_reenters() {
    let (modes, _) = controller();
    let log = Arc::new(Mutex::new(Vec::new()));
    modes.register_handler(Mode::MainViewer, Arc::new(Tracker::shared(&log)));

    modes
        .switch_mode(Mode::MainViewer, SwitchOptions::forced())
        .await
        .unwrap();
    assert_eq!(log.lock().len(), 2);
}

#[tokio::test]
async fn test_unknown_mode_name_is_rejected() {
    let (modes, _) = controller();
    let err = modes
        .switch_mode_named("holodeck", SwitchOptions::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SwitchError::UnknownMode {
            name: "holodeck".into()
        }
    );

    modes
        .switch_mode_named("equipment-edit", SwitchOptions::default())
        .await
        .unwrap();
    assert_eq!(modes.current_mode(), Mode::EquipmentEdit);
}

#[tokio::test]
async fn test_replaced_handler_is_returned() {
    let (modes, _) = controller();
    assert!(
        modes
            .register_handler(Mode::Playback, Arc::new(Tracker::default()))
            .is_none()
    );
    assert!(
        modes
            .register_handler(Mode::Playback, Arc::new(Tracker::default()))
            .is_some()
    );
    assert!(modes.unregister_handler(Mode::Playback).is_some());
    assert!(modes.unregister_handler(Mode::Playback).is_none());
}

#[tokio::test]
async fn test_update_reaches_only_active_handler() {
    let (modes, _) = controller();
    let active = Arc::new(Mutex::new(Vec::new()));
    let idle = Arc::new(Mutex::new(Vec::new()));
    modes.register_handler(Mode::MainViewer, Arc::new(Tracker::shared(&active)));
    modes.register_handler(Mode::Settings, Arc::new(Tracker::shared(&idle)));

    modes.update(&json!({ "temp": 71 }));

    assert_eq!(*active.lock(), vec![r#"update {"temp":71}"#.to_string()]);
    assert!(idle.lock().is_empty());
}

// ── Guards ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_lock_blocks_every_switch_until_unlock() {
    let (modes, _) = controller();
    let rec = Recorder::attach(modes.events());

    modes.lock();
    assert!(modes.is_locked());
    assert_eq!(
        modes.can_enter(Mode::Settings),
        EnterCheck {
            allowed: false,
            reason: Some(EnterReason::Locked),
        }
    );

    for mode in [Mode::Settings, Mode::Analytics, Mode::MainViewer] {
        let err = modes
            .switch_mode(mode, SwitchOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, SwitchError::Locked { mode });
    }
    assert!(rec.events().is_empty());
    assert_eq!(modes.current_mode(), Mode::MainViewer);

    modes.unlock();
    modes
        .switch_mode(Mode::Settings, SwitchOptions::default())
        .await
        .unwrap();
    assert_eq!(modes.current_mode(), Mode::Settings);
}

#[tokio::test]
async fn test_force_bypasses_lock() {
    let (modes, _) = controller();
    modes.lock();
    modes
        .switch_mode(Mode::Playback, SwitchOptions::forced())
        .await
        .unwrap();
    assert_eq!(modes.current_mode(), Mode::Playback);
    assert!(modes.is_locked());
}

#[tokio::test]
async fn test_blocking_mode_refused_while_offline() {
    let (modes, monitor) = controller();
    monitor.force_offline();
    let log = Arc::new(Mutex::new(Vec::new()));
    modes.register_handler(Mode::MainViewer, Arc::new(Tracker::shared(&log)));
    modes.register_handler(Mode::Monitoring, Arc::new(Tracker::shared(&log)));
    let rec = Recorder::attach(modes.events());

    let before = modes.state();
    let err = modes
        .switch_mode(Mode::Monitoring, SwitchOptions::default())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SwitchError::Blocked {
            mode: Mode::Monitoring,
            reason: EnterReason::Offline,
        }
    );
    assert_eq!(
        rec.events(),
        vec![ModeEvent::Blocked {
            mode: Mode::Monitoring,
            reason: EnterReason::Offline,
        }]
    );
    assert_eq!(modes.state(), before);
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn test_skip_connectivity_check_enters_blocking_mode() {
    let (modes, monitor) = controller();
    monitor.force_offline();

    modes
        .switch_mode(
            Mode::Monitoring,
            SwitchOptions::default().skip_connectivity_check(),
        )
        .await
        .unwrap();
    assert_eq!(modes.current_mode(), Mode::Monitoring);
}

#[tokio::test]
async fn test_warn_policy_enters_with_warning() {
    let (modes, monitor) = controller();
    monitor.force_offline();
    let rec = Recorder::attach(modes.events());

    modes
        .switch_mode(Mode::EquipmentEdit, SwitchOptions::default())
        .await
        .unwrap();

    assert_eq!(modes.current_mode(), Mode::EquipmentEdit);
    assert_eq!(
        rec.events().first(),
        Some(&ModeEvent::Warning {
            mode: Mode::EquipmentEdit,
            reason: EnterReason::Warn,
        })
    );
    assert_eq!(changed_count(&rec), 1);
}

#[tokio::test]
async fn test_unknown_verdict_does_not_block() {
    let monitor = monitor(ScriptedProbe::new(vec![]));
    let modes = ModeController::new(ModePolicyTable::default(), monitor);
    assert_eq!(
        modes.can_enter(Mode::Monitoring),
        EnterCheck {
            allowed: true,
            reason: None,
        }
    );
}

#[tokio::test]
async fn test_policy_overrides_change_guard() {
    let monitor = online_monitor();
    monitor.force_offline();
    let table = ModePolicyTable::new(
        Mode::Settings,
        [(Mode::Playback, ModePolicy::new(true, OfflinePolicy::Block))],
    )
    .unwrap();
    let modes = ModeController::new(table, monitor);

    assert_eq!(modes.current_mode(), Mode::Settings);
    assert!(!modes.can_enter(Mode::Playback).allowed);
}

// ── Overlay and history ─────────────────────────────────────────────

#[tokio::test]
async fn test_overlay_then_go_back_restores_once() {
    let (modes, _) = controller();
    modes
        .switch_mode(Mode::Analytics, SwitchOptions::default())
        .await
        .unwrap();
    modes
        .switch_mode(Mode::Settings, SwitchOptions::overlay())
        .await
        .unwrap();
    assert_eq!(modes.state().stack, vec![Mode::Analytics]);

    let back = modes.go_back().await.unwrap();
    assert_eq!(
        back,
        SwitchOutcome::Changed {
            from: Mode::Settings,
            to: Mode::Analytics,
        }
    );
    let state = modes.state();
    assert_eq!(state.current, Mode::Analytics);
    assert!(state.stack.is_empty());
    assert_eq!(state.previous, Some(Mode::Settings));

    // Stack exhausted: falls through to `previous`.
    modes.go_back().await.unwrap();
    assert_eq!(modes.current_mode(), Mode::Settings);
}

#[tokio::test]
async fn test_nested_overlays_pop_in_reverse_order() {
    let (modes, _) = controller();
    modes
        .switch_mode(Mode::Analytics, SwitchOptions::overlay())
        .await
        .unwrap();
    modes
        .switch_mode(Mode::Settings, SwitchOptions::overlay())
        .await
        .unwrap();
    assert_eq!(
        modes.state().stack,
        vec![Mode::MainViewer, Mode::Analytics]
    );

    modes.go_back().await.unwrap();
    assert_eq!(modes.current_mode(), Mode::Analytics);
    assert_eq!(modes.state().stack, vec![Mode::MainViewer]);

    modes.go_back().await.unwrap();
    assert_eq!(modes.current_mode(), Mode::MainViewer);
    assert!(modes.state().stack.is_empty());
}

#[tokio::test]
async fn test_plain_switch_clears_stack() {
    let (modes, _) = controller();
    modes
        .switch_mode(Mode::Settings, SwitchOptions::overlay())
        .await
        .unwrap();
    modes
        .switch_mode(Mode::Playback, SwitchOptions::default())
        .await
        .unwrap();
    assert!(modes.state().stack.is_empty());
}

#[tokio::test]
async fn test_go_back_without_history_fails() {
    let (modes, _) = controller();
    assert_eq!(modes.go_back().await.unwrap_err(), SwitchError::NoHistory);
}

#[tokio::test]
async fn test_go_to_default_ignores_connectivity() {
    let monitor = online_monitor();
    let table = ModePolicyTable::new(
        Mode::Playback,
        [(Mode::Playback, ModePolicy::new(true, OfflinePolicy::Warn))],
    )
    .unwrap();
    let modes = ModeController::new(table, monitor.clone());
    modes
        .switch_mode(Mode::Settings, SwitchOptions::default())
        .await
        .unwrap();
    monitor.force_offline();
    let rec = Recorder::attach(modes.events());

    modes.go_to_default().await.unwrap();
    assert_eq!(modes.current_mode(), Mode::Playback);
    assert!(
        !rec.events()
            .iter()
            .any(|e| matches!(e, ModeEvent::Warning { .. }))
    );
}

// ── Hook failures ───────────────────────────────────────────────────

#[tokio::test]
async fn test_enter_failure_rolls_back_bookkeeping() {
    let (modes, _) = controller();
    modes
        .switch_mode(Mode::Analytics, SwitchOptions::default())
        .await
        .unwrap();
    modes
        .switch_mode(Mode::Settings, SwitchOptions::overlay())
        .await
        .unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    modes.register_handler(Mode::Settings, Arc::new(Tracker::shared(&log)));
    modes.register_handler(
        Mode::Playback,
        Arc::new(Tracker {
            log: Arc::clone(&log),
            fail_enter: true,
            ..Tracker::default()
        }),
    );
    let rec = Recorder::attach(modes.events());
    let before = modes.state();

    let err = modes
        .switch_mode(Mode::Playback, SwitchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SwitchError::Hook {
            mode: Mode::Playback,
            phase: HookPhase::Enter,
            ..
        }
    ));
    assert_eq!(modes.state(), before);
    // The exit hook already ran and is not compensated.
    assert_eq!(
        *log.lock(),
        vec![
            "exit settings to playback".to_string(),
            "enter playback from settings".to_string(),
        ]
    );
    assert_eq!(
        rec.events().last(),
        Some(&ModeEvent::TransitionFailed {
            from: Mode::Settings,
            to: Mode::Playback,
            phase: HookPhase::Enter,
            message: "enter refused".into(),
        })
    );
    assert_eq!(changed_count(&rec), 0);
}

#[tokio::test]
async fn test_exit_failure_aborts_before_state_change() {
    let (modes, _) = controller();
    let log = Arc::new(Mutex::new(Vec::new()));
    modes.register_handler(
        Mode::MainViewer,
        Arc::new(Tracker {
            log: Arc::clone(&log),
            fail_exit: true,
            ..Tracker::default()
        }),
    );
    modes.register_handler(Mode::Settings, Arc::new(Tracker::shared(&log)));

    let err = modes
        .switch_mode(Mode::Settings, SwitchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SwitchError::Hook {
            mode: Mode::MainViewer,
            phase: HookPhase::Exit,
            ..
        }
    ));
    assert_eq!(modes.current_mode(), Mode::MainViewer);
    assert_eq!(*log.lock(), vec!["exit main-viewer to settings".to_string()]);
}

// ── Connectivity loss ───────────────────────────────────────────────

#[tokio::test]
async fn test_revert_leaves_blocking_mode() {
    let (modes, monitor) = controller();
    modes
        .switch_mode(Mode::Monitoring, SwitchOptions::default())
        .await
        .unwrap();
    let rec = Recorder::attach(modes.events());

    monitor.force_offline();
    assert_eq!(modes.revert_if_blocked().await, Some(Mode::Monitoring));

    assert_eq!(modes.current_mode(), Mode::MainViewer);
    assert_eq!(
        rec.events().last(),
        Some(&ModeEvent::ForcedExit {
            from: Mode::Monitoring,
            to: Mode::MainViewer,
            verdict: vigil_core::ConnectivityVerdict::Offline,
        })
    );
}

#[tokio::test]
async fn test_revert_skipped_once_verdict_recovers() {
    let (modes, monitor) = controller();
    modes
        .switch_mode(Mode::Monitoring, SwitchOptions::default())
        .await
        .unwrap();
    let rec = Recorder::attach(modes.events());

    monitor.force_offline();
    monitor.force_online();
    assert_eq!(modes.revert_if_blocked().await, None);

    assert_eq!(modes.current_mode(), Mode::Monitoring);
    assert!(rec.events().is_empty());
}

#[tokio::test]
async fn test_revert_ignores_non_blocking_mode() {
    let (modes, monitor) = controller();
    modes
        .switch_mode(Mode::Analytics, SwitchOptions::default())
        .await
        .unwrap();
    monitor.force_offline();
    assert_eq!(modes.revert_if_blocked().await, None);
    assert_eq!(modes.current_mode(), Mode::Analytics);
}
