//! Pointer interaction with placed annotations
//!
//! All coordinates are page-local, the same space annotations live in.

use crate::annotation::{Annotation, AnnotationId, AnnotationLayer, Position, Size};

/// Side of the square resize handle centred on the bottom-right corner
pub const RESIZE_HANDLE_SIZE: f32 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Gesture {
    Idle,
    /// `offset` is the pointer minus the annotation origin at pointer-down
    Dragging { id: AnnotationId, offset: Position },
    /// `grab` is the pointer minus the bottom-right corner at pointer-down
    Resizing { id: AnnotationId, grab: Position },
}

/// Live, already clamped geometry of an annotation being manipulated
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GesturePreview {
    Move { id: AnnotationId, position: Position },
    Resize { id: AnnotationId, size: Size },
}

impl GesturePreview {
    pub fn id(&self) -> AnnotationId {
        match self {
            GesturePreview::Move { id, .. } | GesturePreview::Resize { id, .. } => *id,
        }
    }
}

/// Keystrokes routed to a text label in edit mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Char(char),
    Backspace,
    /// Leave edit mode
    Escape,
}

pub fn resize_handle_contains(annotation: &Annotation, x: f32, y: f32) -> bool {
    let corner_x = annotation.position().x + annotation.size().width;
    let corner_y = annotation.position().y + annotation.size().height;
    let half = RESIZE_HANDLE_SIZE / 2.0;
    (x - corner_x).abs() <= half && (y - corner_y).abs() <= half
}

/// Drag, resize and edit-mode handling for the annotation layer
///
/// The controller only previews geometry while a gesture is in progress.
/// The layer is mutated once, on pointer-up.
#[derive(Debug)]
pub struct InteractionController {
    gesture: Gesture,
    page: u32,
    preview: Option<GesturePreview>,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionController {
    pub fn new() -> Self {
        Self { gesture: Gesture::Idle, page: 0, preview: None }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.gesture, Gesture::Dragging { .. })
    }

    pub fn is_resizing(&self) -> bool {
        matches!(self.gesture, Gesture::Resizing { .. })
    }

    pub fn active(&self) -> Option<AnnotationId> {
        match self.gesture {
            Gesture::Idle => None,
            Gesture::Dragging { id, .. } | Gesture::Resizing { id, .. } => Some(id),
        }
    }

    pub fn preview(&self) -> Option<GesturePreview> {
        self.preview
    }

    /// Page of the current gesture
    pub fn page(&self) -> Option<u32> {
        (self.gesture != Gesture::Idle).then_some(self.page)
    }

    /// Start a drag or resize on the topmost annotation under the pointer.
    ///
    /// Pressing anywhere other than the label being edited ends edit mode.
    /// The label being edited receives the press but cannot be moved.
    pub fn pointer_down(
        &mut self,
        layer: &mut AnnotationLayer,
        page: u32,
        x: f32,
        y: f32,
    ) -> Option<AnnotationId> {
        self.gesture = Gesture::Idle;
        self.preview = None;

        let handle_hit = layer
            .on_page(page)
            .into_iter()
            .rev()
            .find(|annotation| resize_handle_contains(annotation, x, y))
            .map(Annotation::id);
        let target = handle_hit.or_else(|| layer.hit_test(page, x, y).map(Annotation::id));

        let Some(id) = target else {
            layer.end_edit();
            return None;
        };
        if layer.is_editing(id) {
            return Some(id);
        }
        layer.end_edit();

        let annotation = layer.get(id)?;
        let position = annotation.position();
        let size = annotation.size();
        self.page = page;
        self.gesture = if handle_hit == Some(id) {
            let grab = Position::new(
                x - (position.x + size.width),
                y - (position.y + size.height),
            );
            Gesture::Resizing { id, grab }
        } else {
            Gesture::Dragging { id, offset: Position::new(x - position.x, y - position.y) }
        };
        Some(id)
    }

    pub fn pointer_move(&mut self, layer: &AnnotationLayer, x: f32, y: f32) -> Option<GesturePreview> {
        let preview = match self.gesture {
            Gesture::Idle => return None,
            Gesture::Dragging { id, offset } => {
                let wanted = Position::new(x - offset.x, y - offset.y);
                GesturePreview::Move { id, position: layer.clamped_position(id, wanted)? }
            }
            Gesture::Resizing { id, grab } => {
                let origin = layer.get(id)?.position();
                let wanted = Size::new(x - origin.x - grab.x, y - origin.y - grab.y);
                GesturePreview::Resize { id, size: layer.clamped_size(id, wanted)? }
            }
        };
        self.preview = Some(preview);
        Some(preview)
    }

    /// Finish the gesture and commit its last preview to the layer
    pub fn pointer_up(&mut self, layer: &mut AnnotationLayer) -> Option<GesturePreview> {
        self.gesture = Gesture::Idle;
        let preview = self.preview.take()?;

        match preview {
            GesturePreview::Move { id, position } => layer
                .update_position(id, position)
                .map(|position| GesturePreview::Move { id, position }),
            GesturePreview::Resize { id, size } => {
                layer.update_size(id, size).map(|size| GesturePreview::Resize { id, size })
            }
        }
    }

    /// Abandon the gesture without touching the layer
    pub fn cancel(&mut self) {
        self.gesture = Gesture::Idle;
        self.preview = None;
    }

    /// Enter edit mode on the topmost text label under the pointer
    pub fn double_click(&mut self, layer: &mut AnnotationLayer, page: u32, x: f32, y: f32) -> bool {
        self.cancel();
        match layer.hit_test(page, x, y).map(Annotation::id) {
            Some(id) => layer.begin_edit(id),
            None => false,
        }
    }

    /// Apply a keystroke to the label in edit mode. Returns `false` when no
    /// label is being edited.
    pub fn key_input(&mut self, layer: &mut AnnotationLayer, key: KeyInput) -> bool {
        let Some(id) = layer.editing() else {
            return false;
        };
        let Some(mut text) = layer.get(id).and_then(Annotation::text).map(str::to_owned) else {
            return false;
        };

        match key {
            KeyInput::Char(c) if !c.is_control() => text.push(c),
            KeyInput::Char(_) => return true,
            KeyInput::Backspace => {
                text.pop();
            }
            KeyInput::Escape => {
                layer.end_edit();
                return true;
            }
        }
        layer.update_text(id, text)
    }

    /// Focus left the label being edited
    pub fn blur(&mut self, layer: &mut AnnotationLayer) -> Option<AnnotationId> {
        layer.end_edit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{PageBounds, SignatureImage};
    use pdf_signer_engine::RgbaImage;
    use std::sync::Arc;

    struct Pages;

    impl PageBounds for Pages {
        fn page_count(&self) -> u32 {
            2
        }

        fn page_extent(&self, _page: u32) -> Option<Size> {
            Some(Size::new(600.0, 800.0))
        }
    }

    fn signature() -> SignatureImage {
        SignatureImage::from_rgba(&RgbaImage::new(2, 2)).unwrap()
    }

    fn layer_with_signature() -> (AnnotationLayer, AnnotationId) {
        let mut layer = AnnotationLayer::new(Arc::new(Pages));
        let id = layer
            .add_signature(signature(), Position::new(100.0, 100.0), Size::new(100.0, 50.0), 1)
            .unwrap();
        (layer, id)
    }

    #[test]
    fn test_drag_moves_on_release() {
        let (mut layer, id) = layer_with_signature();
        let mut controller = InteractionController::new();

        assert_eq!(controller.pointer_down(&mut layer, 1, 110.0, 120.0), Some(id));
        assert!(controller.is_dragging());

        let preview = controller.pointer_move(&layer, 210.0, 320.0);
        assert_eq!(preview, Some(GesturePreview::Move { id, position: Position::new(200.0, 300.0) }));
        assert_eq!(layer.get(id).unwrap().position(), Position::new(100.0, 100.0));

        controller.pointer_up(&mut layer);
        assert_eq!(layer.get(id).unwrap().position(), Position::new(200.0, 300.0));
        assert!(controller.active().is_none());
    }

    #[test]
    fn test_drag_clamped_to_page() {
        let (mut layer, id) = layer_with_signature();
        let mut controller = InteractionController::new();

        controller.pointer_down(&mut layer, 1, 110.0, 120.0);
        controller.pointer_move(&layer, 5000.0, -400.0);
        let applied = controller.pointer_up(&mut layer);

        assert_eq!(applied, Some(GesturePreview::Move { id, position: Position::new(500.0, 0.0) }));
    }

    #[test]
    fn test_resize_from_handle() {
        let (mut layer, id) = layer_with_signature();
        let mut controller = InteractionController::new();

        // Corner is at (200, 150); grab 3px inside it
        controller.pointer_down(&mut layer, 1, 197.0, 147.0);
        assert!(controller.is_resizing());

        controller.pointer_move(&layer, 247.0, 177.0);
        controller.pointer_up(&mut layer);
        assert_eq!(layer.get(id).unwrap().size(), Size::new(150.0, 80.0));
    }

    #[test]
    fn test_resize_past_right_edge() {
        let (mut layer, id) = layer_with_signature();
        let mut controller = InteractionController::new();

        controller.pointer_down(&mut layer, 1, 200.0, 150.0);
        controller.pointer_move(&layer, 900.0, 150.0);
        controller.pointer_up(&mut layer);

        let annotation = layer.get(id).unwrap();
        assert_eq!(annotation.position().x + annotation.size().width, 600.0);
    }

    #[test]
    fn test_resize_floors_at_minimum() {
        let (mut layer, id) = layer_with_signature();
        let mut controller = InteractionController::new();

        controller.pointer_down(&mut layer, 1, 200.0, 150.0);
        controller.pointer_move(&layer, 0.0, 0.0);
        controller.pointer_up(&mut layer);

        assert_eq!(layer.get(id).unwrap().size(), Size::new(20.0, 20.0));
    }

    #[test]
    fn test_release_without_move_leaves_layer_untouched() {
        let (mut layer, id) = layer_with_signature();
        let mut controller = InteractionController::new();

        controller.pointer_down(&mut layer, 1, 110.0, 120.0);
        assert_eq!(controller.pointer_up(&mut layer), None);
        assert_eq!(layer.get(id).unwrap().position(), Position::new(100.0, 100.0));
    }

    #[test]
    fn test_miss_and_other_page() {
        let (mut layer, _) = layer_with_signature();
        let mut controller = InteractionController::new();

        assert_eq!(controller.pointer_down(&mut layer, 1, 400.0, 400.0), None);
        assert_eq!(controller.pointer_down(&mut layer, 2, 110.0, 120.0), None);
        assert_eq!(controller.pointer_move(&layer, 0.0, 0.0), None);
    }

    #[test]
    fn test_editing_disables_drag_and_takes_keys() {
        let mut layer = AnnotationLayer::new(Arc::new(Pages));
        let id = layer.add_text_label(Position::new(10.0, 10.0), Size::new(120.0, 32.0), 1).unwrap();
        let mut controller = InteractionController::new();

        assert_eq!(controller.pointer_down(&mut layer, 1, 20.0, 20.0), Some(id));
        assert!(!controller.is_dragging());
        assert!(layer.is_editing(id));

        for c in "Hi!".chars() {
            assert!(controller.key_input(&mut layer, KeyInput::Char(c)));
        }
        controller.key_input(&mut layer, KeyInput::Backspace);
        controller.key_input(&mut layer, KeyInput::Char('\n'));
        assert_eq!(layer.get(id).unwrap().text(), Some("Hi"));

        assert_eq!(controller.blur(&mut layer), Some(id));
        assert!(!controller.key_input(&mut layer, KeyInput::Char('x')));

        // Out of edit mode the label drags like anything else
        controller.pointer_down(&mut layer, 1, 20.0, 20.0);
        assert!(controller.is_dragging());
    }

    #[test]
    fn test_double_click_enters_edit_mode() {
        let mut layer = AnnotationLayer::new(Arc::new(Pages));
        let sig = layer
            .add_signature(signature(), Position::new(300.0, 300.0), Size::new(60.0, 30.0), 1)
            .unwrap();
        let text = layer.add_text_label(Position::new(10.0, 10.0), Size::new(120.0, 32.0), 1).unwrap();
        layer.end_edit();
        let mut controller = InteractionController::new();

        assert!(!controller.double_click(&mut layer, 1, 310.0, 310.0));
        assert!(!layer.is_editing(sig));
        assert!(controller.double_click(&mut layer, 1, 15.0, 15.0));
        assert!(layer.is_editing(text));

        assert!(controller.key_input(&mut layer, KeyInput::Escape));
        assert_eq!(layer.editing(), None);
    }

    #[test]
    fn test_pressing_elsewhere_ends_edit() {
        let mut layer = AnnotationLayer::new(Arc::new(Pages));
        let id = layer.add_text_label(Position::new(10.0, 10.0), Size::new(120.0, 32.0), 1).unwrap();
        let mut controller = InteractionController::new();

        controller.pointer_down(&mut layer, 1, 500.0, 500.0);
        assert!(!layer.is_editing(id));
    }
}
