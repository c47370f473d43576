//! Mapping from raw unit status to lifecycle state.
//!
//! Rules are evaluated in order and the first match wins:
//!
//! 1. unit unknown to the service manager: `finished`
//! 2. `active` or `reloading`: `running`
//! 3. `activating`: `starting`
//! 4. `deactivating`: `finishing`
//! 5. `failed`: `error`
//! 6. `inactive`: `finished` on success, `error` on an exit-code result or a
//!    recorded non-zero exit status, `finished` otherwise
//! 7. fallback: `running` if the sub-state says so, `error` on a non-zero
//!    exit status, `unknown` otherwise
//!
//! `created` and `terminated` are never produced here.

use envbox_common::types::LifecycleState;
use envbox_core::unit::{ActiveState, LoadState, RawStatus, SubState, UnitResult};

/// Derives the lifecycle state from a raw unit status.
#[must_use]
pub fn reconcile(raw: &RawStatus) -> LifecycleState {
    if raw.load_state == LoadState::NotFound {
        return LifecycleState::Finished;
    }

    let failed_exit = raw.exit_code.is_some_and(|code| code != 0);

    match raw.active_state {
        ActiveState::Active | ActiveState::Reloading => LifecycleState::Running,
        ActiveState::Activating => LifecycleState::Starting,
        ActiveState::Deactivating => LifecycleState::Finishing,
        ActiveState::Failed => LifecycleState::Error,
        ActiveState::Inactive => match raw.result {
            UnitResult::Success => LifecycleState::Finished,
            UnitResult::ExitCode => LifecycleState::Error,
            _ if failed_exit => LifecycleState::Error,
            _ => LifecycleState::Finished,
        },
        ActiveState::Other => {
            if raw.sub_state == SubState::Running {
                LifecycleState::Running
            } else if failed_exit {
                LifecycleState::Error
            } else {
                LifecycleState::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(active: ActiveState, result: UnitResult, exit: Option<i32>) -> RawStatus {
        RawStatus {
            load_state: LoadState::Loaded,
            active_state: active,
            sub_state: SubState::Other,
            result,
            exit_code: exit,
            main_pid: None,
        }
    }

    #[test]
    fn missing_unit_is_finished() {
        assert_eq!(reconcile(&RawStatus::not_found()), LifecycleState::Finished);
    }

    #[test]
    fn missing_unit_wins_over_everything_else() {
        let mut status = raw(ActiveState::Active, UnitResult::ExitCode, Some(1));
        status.load_state = LoadState::NotFound;
        assert_eq!(reconcile(&status), LifecycleState::Finished);
    }

    #[test]
    fn active_states() {
        for active in [ActiveState::Active, ActiveState::Reloading] {
            assert_eq!(
                reconcile(&raw(active, UnitResult::Success, None)),
                LifecycleState::Running
            );
        }
        assert_eq!(
            reconcile(&raw(ActiveState::Activating, UnitResult::Success, None)),
            LifecycleState::Starting
        );
        assert_eq!(
            reconcile(&raw(ActiveState::Deactivating, UnitResult::Success, None)),
            LifecycleState::Finishing
        );
    }

    #[test]
    fn failed_unit_is_error_even_with_zero_exit() {
        assert_eq!(
            reconcile(&raw(ActiveState::Failed, UnitResult::Success, Some(0))),
            LifecycleState::Error
        );
    }

    #[test]
    fn inactive_outcomes() {
        assert_eq!(
            reconcile(&raw(ActiveState::Inactive, UnitResult::Success, Some(3))),
            LifecycleState::Finished
        );
        assert_eq!(
            reconcile(&raw(ActiveState::Inactive, UnitResult::ExitCode, None)),
            LifecycleState::Error
        );
        assert_eq!(
            reconcile(&raw(ActiveState::Inactive, UnitResult::Signal, Some(137))),
            LifecycleState::Error
        );
        assert_eq!(
            reconcile(&raw(ActiveState::Inactive, UnitResult::Signal, None)),
            LifecycleState::Finished
        );
    }

    #[test]
    fn fallback_rules() {
        let mut status = raw(ActiveState::Other, UnitResult::Other, None);
        assert_eq!(reconcile(&status), LifecycleState::Unknown);

        status.exit_code = Some(2);
        assert_eq!(reconcile(&status), LifecycleState::Error);

        status.sub_state = SubState::Running;
        assert_eq!(reconcile(&status), LifecycleState::Running);
    }

    #[test]
    fn unreachable_manager_is_unknown() {
        assert_eq!(reconcile(&RawStatus::unreachable()), LifecycleState::Unknown);
    }

    #[test]
    fn never_yields_caller_owned_states() {
        let actives = [
            ActiveState::Active,
            ActiveState::Reloading,
            ActiveState::Inactive,
            ActiveState::Failed,
            ActiveState::Activating,
            ActiveState::Deactivating,
            ActiveState::Other,
        ];
        let results = [
            UnitResult::Success,
            UnitResult::ExitCode,
            UnitResult::Signal,
            UnitResult::Other,
        ];
        for active in actives {
            for result in results {
                for exit in [None, Some(0), Some(1)] {
                    let state = reconcile(&raw(active, result, exit));
                    assert_ne!(state, LifecycleState::Created);
                    assert_ne!(state, LifecycleState::Terminated);
                }
            }
        }
    }

    #[test]
    fn reconciliation_is_pure() {
        let status = raw(ActiveState::Inactive, UnitResult::Signal, Some(9));
        assert_eq!(reconcile(&status), reconcile(&status));
    }
}
