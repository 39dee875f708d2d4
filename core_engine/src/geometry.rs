use crate::tree::{NodeInfo, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputStatus {
    #[default]
    Unknown,
    /// Character positions are known, the overlay follows the caret.
    Typing,
    /// The field only shows its placeholder.
    HintText,
}

/// Where the overlay should be drawn relative to the input field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub rect: Rect,
    pub field_width: i32,
    pub status: InputStatus,
    pub text_size_px: f32,
}

/// Content sits above the input when its vertical midpoint is above the
/// input's bottom edge.
pub fn is_content_above_input(content: Rect, input: Rect) -> bool {
    content.center_y() < input.bottom
}

/// Computes the overlay anchor for the input field described by `input`.
pub fn measure_anchor(input: &NodeInfo, default_text_size_px: f32) -> Anchor {
    let bounds = input.bounds;
    let mut rect = bounds;
    let known: Vec<Rect> = input.char_bounds.iter().flatten().copied().collect();

    let status = match (known.first(), known.last()) {
        (Some(first), Some(last)) => {
            let rtl = (first.left - bounds.left).abs() > (first.right - bounds.right).abs();
            if rtl {
                rect.right = last.left;
            } else {
                rect.left = last.right;
            }
            rect.top = last.top;
            rect.bottom = last.bottom;
            InputStatus::Typing
        }
        _ => {
            let inset = bounds.width() / 4;
            rect.left += inset;
            rect.right -= inset;
            InputStatus::HintText
        }
    };

    Anchor {
        rect,
        field_width: bounds.width(),
        status,
        text_size_px: input.text_size_px.unwrap_or(default_text_size_px),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> NodeInfo {
        NodeInfo::new("pkg", "android.widget.EditText").with_bounds(Rect::new(100, 1800, 900, 1900))
    }

    #[test]
    fn content_must_be_above_input() {
        let input = Rect::new(0, 1800, 1080, 1900);
        assert!(is_content_above_input(Rect::new(0, 200, 1080, 1700), input));
        assert!(!is_content_above_input(Rect::new(0, 1850, 1080, 2200), input));
    }

    #[test]
    fn anchors_after_last_character() {
        let mut info = field();
        info.char_bounds = vec![
            Some(Rect::new(110, 1820, 130, 1870)),
            None,
            Some(Rect::new(130, 1825, 150, 1875)),
        ];
        let anchor = measure_anchor(&info, 48.0);
        assert_eq!(anchor.status, InputStatus::Typing);
        assert_eq!(anchor.rect, Rect::new(150, 1825, 900, 1875));
        assert_eq!(anchor.field_width, 800);
    }

    #[test]
    fn anchors_before_last_character_for_rtl() {
        let mut info = field();
        info.char_bounds = vec![
            Some(Rect::new(870, 1820, 890, 1870)),
            Some(Rect::new(850, 1820, 870, 1870)),
        ];
        let anchor = measure_anchor(&info, 48.0);
        assert_eq!(anchor.rect, Rect::new(100, 1820, 850, 1870));
    }

    #[test]
    fn hint_text_narrows_field() {
        let mut info = field();
        info.text_size_px = Some(40.0);
        let anchor = measure_anchor(&info, 48.0);
        assert_eq!(anchor.status, InputStatus::HintText);
        assert_eq!(anchor.rect, Rect::new(300, 1800, 700, 1900));
        assert_eq!(anchor.text_size_px, 40.0);
    }
}
