use std::time::Duration;

use crate::{scene::Scene, NodeId, Rect};

/// One visible node as it would be painted this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawItem {
    pub node: NodeId,
    pub kind: &'static str,
    pub rect: Rect,
    /// Product of the node's opacity and that of all its ancestors.
    pub opacity: f64,
    pub angle: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RenderFrame {
    pub frame: u64,
    pub time: Duration,
    pub items: Vec<DrawItem>,
    /// Nodes whose attributes changed since the previous frame.
    pub changed: usize,
}

/// Headless rendering backend. Builds the paint-ordered draw list for each
/// frame and keeps the most recent one around for inspection.
#[derive(Debug, Default)]
pub struct RenderGraph {
    last_frame: Option<RenderFrame>,
    frames_rendered: u64,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, scene: &mut Scene, time: Duration) -> &RenderFrame {
        let changed = scene.take_dirty().len();
        let mut items = Vec::new();
        collect(scene, scene.root(), 0.0, 0.0, 1.0, &mut items);

        self.frames_rendered += 1;
        tracing::trace!(frame = self.frames_rendered, items = items.len(), changed, "rendered frame");
        self.last_frame.insert(RenderFrame {
            frame: self.frames_rendered,
            time,
            items,
            changed,
        })
    }

    pub fn last_frame(&self) -> Option<&RenderFrame> {
        self.last_frame.as_ref()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn reset(&mut self) {
        self.last_frame = None;
        self.frames_rendered = 0;
    }
}

fn collect(scene: &Scene, id: NodeId, origin_x: f64, origin_y: f64, parent_opacity: f64, out: &mut Vec<DrawItem>) {
    let Ok(node) = scene.node(id) else {
        return;
    };
    let opacity = parent_opacity * node.opacity();
    if opacity <= 0.0 {
        return;
    }
    let rect = node.rect().offset(origin_x, origin_y);
    out.push(DrawItem {
        node: id,
        kind: node.kind().name(),
        rect,
        opacity,
        angle: node.angle(),
    });
    for child in node.visible_children() {
        collect(scene, *child, rect.x, rect.y, opacity, out);
    }
}
