use serde::Serialize;

use crate::error::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneState {
    Queued,
    Cached,
    Downloading,
    Downloaded,
    Extracting,
    Extracted,
    Computing,
    Computed,
    Rendering,
    Rendered,
    Failed(Stage),
}

impl SceneState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SceneState::Rendered | SceneState::Failed(_))
    }

    pub fn can_advance_to(self, next: SceneState) -> bool {
        use SceneState::*;
        if let Failed(_) = next {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Queued, Cached)
                | (Queued, Downloading)
                | (Cached, Extracting)
                | (Cached, Extracted)
                | (Downloading, Downloaded)
                | (Downloaded, Extracting)
                | (Downloaded, Extracted)
                | (Extracting, Extracted)
                | (Extracted, Computing)
                | (Computing, Computed)
                | (Computed, Rendering)
                | (Rendering, Rendered)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SceneLifecycle {
    scene_id: String,
    state: SceneState,
    history: Vec<SceneState>,
}

impl SceneLifecycle {
    pub fn new(scene_id: impl Into<String>) -> Self {
        Self {
            scene_id: scene_id.into(),
            state: SceneState::Queued,
            history: vec![SceneState::Queued],
        }
    }

    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn history(&self) -> &[SceneState] {
        &self.history
    }

    pub fn advance(&mut self, next: SceneState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid scene transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(scene = %self.scene_id, from = ?self.state, to = ?next, "scene transition");
        self.state = next;
        self.history.push(next);
    }

    pub fn fail(&mut self, stage: Stage) {
        self.advance(SceneState::Failed(stage));
    }
}
