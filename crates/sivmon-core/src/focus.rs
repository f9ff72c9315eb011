// ── View focus ──
//
// At most one resource is focused. The controller only tracks state and
// computes the cadence each resource should run at; the caller applies
// the plan to its poller while holding the focus lock, so a transfer is
// never observed half-done.

use crate::model::ResourceId;
use crate::poller::Cadence;

/// Result of a focus request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusTransition {
    Entered(ResourceId),
    Transferred { from: ResourceId, to: ResourceId },
    /// The resource was already focused.
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct FocusController {
    focused: Option<ResourceId>,
    suspend_background: bool,
}

impl FocusController {
    pub fn new(suspend_background: bool) -> Self {
        Self {
            focused: None,
            suspend_background,
        }
    }

    pub fn focused(&self) -> Option<&ResourceId> {
        self.focused.as_ref()
    }

    pub fn focus(&mut self, id: ResourceId) -> FocusTransition {
        match self.focused.replace(id.clone()) {
            None => FocusTransition::Entered(id),
            Some(previous) if previous == id => FocusTransition::Unchanged,
            Some(previous) => FocusTransition::Transferred {
                from: previous,
                to: id,
            },
        }
    }

    /// Leave focus; returns the resource that was focused.
    pub fn unfocus(&mut self) -> Option<ResourceId> {
        self.focused.take()
    }

    /// Exit focus if `id` was the focused resource.
    pub fn on_resource_removed(&mut self, id: &ResourceId) -> bool {
        if self.focused.as_ref() == Some(id) {
            self.focused = None;
            true
        } else {
            false
        }
    }

    /// Cadence `id` should run at under the current focus.
    pub fn cadence_for(&self, id: &ResourceId) -> Cadence {
        match &self.focused {
            Some(focused) if focused == id => Cadence::Focused,
            Some(_) if self.suspend_background => Cadence::Suspended,
            _ => Cadence::Standard,
        }
    }

    pub fn cadence_plan<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a ResourceId>,
    ) -> Vec<(ResourceId, Cadence)> {
        ids.into_iter()
            .map(|id| (id.clone(), self.cadence_for(id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> Vec<ResourceId> {
        ["1", "2", "3"].into_iter().map(ResourceId::from).collect()
    }

    #[test]
    fn focus_transfers_atomically() {
        let mut focus = FocusController::new(true);
        assert_eq!(
            focus.focus(ResourceId::from("1")),
            FocusTransition::Entered(ResourceId::from("1"))
        );
        assert_eq!(
            focus.focus(ResourceId::from("2")),
            FocusTransition::Transferred {
                from: ResourceId::from("1"),
                to: ResourceId::from("2"),
            }
        );
        assert_eq!(focus.focus(ResourceId::from("2")), FocusTransition::Unchanged);

        let focused: Vec<_> = focus
            .cadence_plan(&ids())
            .into_iter()
            .filter(|(_, c)| *c == Cadence::Focused)
            .collect();
        assert_eq!(focused.len(), 1);
    }

    #[test]
    fn background_is_suspended_only_when_configured() {
        let ids = ids();
        let mut suspending = FocusController::new(true);
        suspending.focus(ResourceId::from("2"));
        let plan: Vec<_> = suspending.cadence_plan(&ids).into_iter().map(|(_, c)| c).collect();
        assert_eq!(plan, vec![Cadence::Suspended, Cadence::Focused, Cadence::Suspended]);

        let mut keeping = FocusController::new(false);
        keeping.focus(ResourceId::from("2"));
        let plan: Vec<_> = keeping.cadence_plan(&ids).into_iter().map(|(_, c)| c).collect();
        assert_eq!(plan, vec![Cadence::Standard, Cadence::Focused, Cadence::Standard]);
    }

    #[test]
    fn exiting_focus_restores_standard_cadence() {
        let ids = ids();
        let mut focus = FocusController::new(true);
        focus.focus(ResourceId::from("1"));
        assert_eq!(focus.unfocus(), Some(ResourceId::from("1")));
        assert!(focus.cadence_plan(&ids).iter().all(|(_, c)| *c == Cadence::Standard));
    }

    #[test]
    fn removing_the_focused_resource_exits_focus() {
        let mut focus = FocusController::new(true);
        focus.focus(ResourceId::from("1"));
        assert!(!focus.on_resource_removed(&ResourceId::from("2")));
        assert!(focus.on_resource_removed(&ResourceId::from("1")));
        assert!(focus.focused().is_none());
    }
}
