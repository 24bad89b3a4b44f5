//! Size modes to `scale` filters, anchors to overlay expressions.

use vbr_media_model::{AspectConstraint, Canvas, HAlign, Position, Size, VAlign};

use crate::graph::{format_number, Filter};

/// The `scale` filter for a size mode, or `None` when it would be an identity.
pub fn scale_filter(size: &Size, canvas: Canvas) -> Option<Filter> {
    let (width, height) = match size {
        Size::Contain | Size::Cover => (canvas.width.to_string(), canvas.height.to_string()),
        Size::Pixels { width, height } => {
            if *width == 0 || *height == 0 {
                return None;
            }
            (width.to_string(), height.to_string())
        }
        Size::CanvasPercent { .. } => {
            let (w, h) = size.target_box(canvas)?;
            (w.to_string(), h.to_string())
        }
        Size::Scale { .. } => {
            let (sx, sy) = size.scale_factors()?;
            if sx == 1.0 && sy == 1.0 {
                return None;
            }
            (
                format!("iw*{}", format_number(sx)),
                format!("ih*{}", format_number(sy)),
            )
        }
        Size::FitWidth => (canvas.width.to_string(), "-1".to_string()),
        Size::FitHeight => ("-1".to_string(), canvas.height.to_string()),
    };

    let filter = Filter::new("scale").arg(width).arg(height);
    Some(match size.aspect_constraint() {
        AspectConstraint::Decrease => filter.named("force_original_aspect_ratio", "decrease"),
        AspectConstraint::Increase => filter.named("force_original_aspect_ratio", "increase"),
        AspectConstraint::None => filter,
    })
}

/// Overlay `x`/`y` expressions, unquoted.
///
/// Canvas-percent layers are anchored by their target box; the scaled clip
/// is then aligned inside that box on the edge the anchor names. All other
/// modes anchor the clip's own frame (`w`, `h`).
pub fn overlay_position(position: &Position, size: &Size, canvas: Canvas) -> (String, String) {
    let (anchor, dx, dy) = match position {
        Position::Expr { x, y } => return (x.clone(), y.clone()),
        Position::Anchored { anchor, dx, dy } => (*anchor, *dx, *dy),
    };

    let Some((box_w, box_h)) = size.target_box(canvas) else {
        let x = match anchor.horizontal() {
            HAlign::Left => "0".to_string(),
            HAlign::Center => "(W-w)/2".to_string(),
            HAlign::Right => "W-w".to_string(),
        };
        let y = match anchor.vertical() {
            VAlign::Top => "0".to_string(),
            VAlign::Center => "(H-h)/2".to_string(),
            VAlign::Bottom => "H-h".to_string(),
        };
        return (with_offset(x, dx), with_offset(y, dy));
    };

    let box_x = with_offset(
        match anchor.horizontal() {
            HAlign::Left => "0".to_string(),
            HAlign::Center => format!("(W-{box_w})/2"),
            HAlign::Right => format!("W-{box_w}"),
        },
        dx,
    );
    let box_y = with_offset(
        match anchor.vertical() {
            VAlign::Top => "0".to_string(),
            VAlign::Center => format!("(H-{box_h})/2"),
            VAlign::Bottom => format!("H-{box_h}"),
        },
        dy,
    );

    let x = match anchor.horizontal() {
        HAlign::Left => box_x,
        HAlign::Center => format!("({box_x})+({box_w}-w)/2"),
        HAlign::Right => format!("({box_x})+({box_w}-w)"),
    };
    let y = match anchor.vertical() {
        VAlign::Top => box_y,
        VAlign::Center => format!("({box_y})+({box_h}-h)/2"),
        VAlign::Bottom => format!("({box_y})+({box_h}-h)"),
    };
    (x, y)
}

fn with_offset(base: String, offset: i32) -> String {
    if offset == 0 {
        base
    } else {
        format!("{base}{offset:+}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbr_media_model::Anchor;

    fn hd() -> Canvas {
        Canvas::new(1920, 1080, 30.0).unwrap()
    }

    fn anchored(anchor: Anchor, dx: i32, dy: i32) -> Position {
        Position::Anchored { anchor, dx, dy }
    }

    fn scale(size: Size) -> Option<String> {
        scale_filter(&size, hd()).map(|f| f.to_string())
    }

    #[test]
    fn test_scale_per_mode() {
        assert_eq!(
            scale(Size::Contain).as_deref(),
            Some("scale=1920:1080:force_original_aspect_ratio=decrease")
        );
        assert_eq!(
            scale(Size::Cover).as_deref(),
            Some("scale=1920:1080:force_original_aspect_ratio=increase")
        );
        assert_eq!(
            scale(Size::Pixels {
                width: 640,
                height: 360
            })
            .as_deref(),
            Some("scale=640:360")
        );
        assert_eq!(
            scale(Size::percent(50.0)).as_deref(),
            Some("scale=960:540:force_original_aspect_ratio=decrease")
        );
        assert_eq!(scale(Size::scale(0.5)).as_deref(), Some("scale=iw*0.5:ih*0.5"));
        assert_eq!(
            scale(Size::Scale {
                x: None,
                y: Some(2.0)
            })
            .as_deref(),
            Some("scale=iw*2:ih*2")
        );
        assert_eq!(scale(Size::FitWidth).as_deref(), Some("scale=1920:-1"));
        assert_eq!(scale(Size::FitHeight).as_deref(), Some("scale=-1:1080"));
    }

    #[test]
    fn test_identity_scale_skipped() {
        assert!(scale(Size::scale(1.0)).is_none());
        assert!(scale(Size::Pixels {
            width: 0,
            height: 100
        })
        .is_none());
    }

    #[test]
    fn test_aspect_constraint_matches_mode() {
        let cases = [
            (Size::Contain, Some("decrease")),
            (Size::Cover, Some("increase")),
            (
                Size::Pixels {
                    width: 10,
                    height: 10,
                },
                None,
            ),
            (Size::percent(30.0), Some("decrease")),
            (Size::scale(2.0), None),
            (Size::FitWidth, None),
            (Size::FitHeight, None),
        ];
        for (size, expected) in cases {
            let filter = scale_filter(&size, hd()).unwrap();
            assert_eq!(filter.option("force_original_aspect_ratio"), expected, "{size:?}");
        }
    }

    #[test]
    fn test_frame_anchors() {
        let size = Size::Contain;
        assert_eq!(
            overlay_position(&anchored(Anchor::Center, 0, 0), &size, hd()),
            ("(W-w)/2".to_string(), "(H-h)/2".to_string())
        );
        assert_eq!(
            overlay_position(&anchored(Anchor::BottomRight, -20, -10), &size, hd()),
            ("W-w-20".to_string(), "H-h-10".to_string())
        );
        assert_eq!(
            overlay_position(&anchored(Anchor::TopLeft, 15, 5), &size, hd()),
            ("0+15".to_string(), "0+5".to_string())
        );
    }

    #[test]
    fn test_custom_expressions_pass_through() {
        let position = Position::Expr {
            x: "W-w-10".into(),
            y: "10+t*5".into(),
        };
        assert_eq!(
            overlay_position(&position, &Size::percent(50.0), hd()),
            ("W-w-10".to_string(), "10+t*5".to_string())
        );
    }

    #[test]
    fn test_percent_anchors_align_inside_box() {
        let size = Size::percent(50.0);
        let at = |anchor| overlay_position(&anchored(anchor, 0, 0), &size, hd());

        assert_eq!(at(Anchor::TopLeft), ("0".to_string(), "0".to_string()));
        assert_eq!(
            at(Anchor::TopRight),
            ("(W-960)+(960-w)".to_string(), "0".to_string())
        );
        assert_eq!(
            at(Anchor::Center),
            (
                "((W-960)/2)+(960-w)/2".to_string(),
                "((H-540)/2)+(540-h)/2".to_string()
            )
        );
        assert_eq!(
            at(Anchor::BottomCenter),
            (
                "((W-960)/2)+(960-w)/2".to_string(),
                "(H-540)+(540-h)".to_string()
            )
        );
        assert_eq!(
            at(Anchor::CenterLeft),
            ("0".to_string(), "((H-540)/2)+(540-h)/2".to_string())
        );
    }

    #[test]
    fn test_percent_anchor_offsets_apply_to_box() {
        let size = Size::percent(25.0);
        let (x, y) = overlay_position(&anchored(Anchor::BottomRight, -20, -20), &size, hd());
        assert_eq!(x, "(W-480-20)+(480-w)");
        assert_eq!(y, "(H-270-20)+(270-h)");
    }

    #[test]
    fn test_every_anchor_references_box_for_percent() {
        let size = Size::percent(40.0);
        for anchor in Anchor::ALL {
            let (x, y) = overlay_position(&anchored(anchor, 0, 0), &size, hd());
            match anchor.horizontal() {
                HAlign::Left => assert_eq!(x, "0"),
                HAlign::Center => assert!(x.ends_with("+(768-w)/2"), "{anchor:?}: {x}"),
                HAlign::Right => assert!(x.ends_with("+(768-w)"), "{anchor:?}: {x}"),
            }
            match anchor.vertical() {
                VAlign::Top => assert_eq!(y, "0"),
                VAlign::Center => assert!(y.ends_with("+(432-h)/2"), "{anchor:?}: {y}"),
                VAlign::Bottom => assert!(y.ends_with("+(432-h)"), "{anchor:?}: {y}"),
            }
        }
    }
}
