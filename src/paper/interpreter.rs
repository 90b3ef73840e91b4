//! Execution of drawing and render-state instructions.
//!
//! Band, reset, image, editor and page instructions touch document state and
//! are handled by [`crate::paper::document`]; everything else goes through
//! [`execute`], which only needs the render state, the pass flags and a
//! surface.

use crate::paper::instruction::{Instruction, RectOp};
use crate::paper::model::{DeviceRect, PaintMode, RenderState};
use crate::paper::surface::Surface;

/// Bézier handle length for a quarter circle.
pub const KAPPA: f64 = 0.5522848;

/// Per-pass settings the instructions read but never change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassEnv {
    /// Device/document ratio.
    pub ratio: f64,
    /// `false` after a `b` band: state still changes but nothing is drawn.
    pub painting: bool,
}

/// Puts the surface in the state a fresh pass starts from.
pub fn apply_defaults(state: &RenderState, surface: &mut dyn Surface) {
    surface.set_transform(state.transform);
    surface.set_fill_color(state.fill_color);
    surface.set_stroke_color(state.stroke_color);
    surface.set_line_width(state.line_width);
    surface.set_font(&state.font);
}

/// Runs one instruction. Returns `false` for instructions this module doesn't own.
pub fn execute(
    state: &mut RenderState,
    env: PassEnv,
    surface: &mut dyn Surface,
    instruction: &Instruction,
) -> bool {
    match instruction {
        Instruction::Line { x1, y1, x2, y2 } => {
            if env.painting {
                line(state, env, surface, (*x1, *y1), (*x2, *y2));
            }
        }
        Instruction::Rect { op, rect } => rectangle(state, env, surface, *op, *rect),
        Instruction::RoundRect { mode, radius, rect } => {
            if env.painting {
                round_rect_path(surface, *radius, *rect);
            }
            finish_path(state, env, surface, *mode);
        }
        Instruction::Ellipse { mode, rect } => {
            if env.painting {
                ellipse_path(surface, *rect);
            }
            finish_path(state, env, surface, *mode);
        }
        Instruction::Text {
            mode,
            x,
            y,
            text,
            max_width,
        } => {
            if mode.fills() {
                surface.set_fill_color(state.text_color);
            }
            if env.painting {
                if mode.fills() {
                    surface.fill_text(text, *x, *y, *max_width);
                }
                if mode.strokes() {
                    surface.stroke_text(text, *x, *y, *max_width);
                }
            }
            surface.set_fill_color(state.fill_color);
        }
        Instruction::FillColor(color) => state.fill_color = *color,
        Instruction::TextColor(color) => state.text_color = *color,
        Instruction::StrokeColor(color) => {
            state.stroke_color = *color;
            surface.set_stroke_color(*color);
        }
        Instruction::LineWidth(width) => {
            // Hairlines follow the device ratio so they stay one device pixel wide.
            state.line_width = if *width <= 1.0 { env.ratio } else { *width };
            surface.set_line_width(state.line_width);
        }
        Instruction::FontFamily(family) => {
            state.font.family = family.clone();
            surface.set_font(&state.font);
        }
        Instruction::Font { mask, size } => {
            state.font.mask = *mask;
            state.font.size = *size;
            surface.set_font(&state.font);
        }
        Instruction::FontMetrics(metrics) => state.metrics = *metrics,
        Instruction::Transform { dx, dy, angle } => {
            state.transform = state.transform.translate(*dx, *dy).rotate(*angle);
            surface.set_transform(state.transform);
        }
        Instruction::ResetTransform => {
            state.transform = Default::default();
            surface.set_transform(state.transform);
        }
        Instruction::LegacyOrigin { .. }
        | Instruction::Reserved(_)
        | Instruction::Separator
        | Instruction::Unknown(_) => {}
        _ => return false,
    }
    true
}

fn line(
    state: &RenderState,
    env: PassEnv,
    surface: &mut dyn Surface,
    from: (f64, f64),
    to: (f64, f64),
) {
    let axis_aligned = from.0 == to.0 || from.1 == to.1;
    // Odd widths centred on a pixel edge blur across two pixels; shift onto the pixel centre.
    let offset = if axis_aligned && env.ratio == 1.0 && (state.line_width.round() as i64) & 1 == 1 {
        -0.5
    } else {
        0.0
    };
    surface.begin_path();
    surface.move_to(from.0 + offset, from.1 + offset);
    surface.line_to(to.0 + offset, to.1 + offset);
    surface.stroke();
}

fn rectangle(
    state: &RenderState,
    env: PassEnv,
    surface: &mut dyn Surface,
    op: RectOp,
    rect: DeviceRect,
) {
    match op {
        RectOp::Clear => {
            if env.painting {
                surface.clear_rect(rect);
            }
        }
        RectOp::Paint(PaintMode::Stroke) => {
            if env.painting {
                surface.stroke_rect(rect);
            }
        }
        RectOp::Paint(PaintMode::Fill) => {
            surface.set_fill_color(state.fill_color);
            if env.painting {
                surface.fill_rect(rect);
            }
        }
        RectOp::Paint(PaintMode::FillAndStroke) => {
            surface.set_fill_color(state.fill_color);
            if env.painting {
                surface.begin_path();
                surface.rect(rect);
                surface.fill();
                surface.stroke();
            }
        }
    }
}

fn finish_path(state: &RenderState, env: PassEnv, surface: &mut dyn Surface, mode: PaintMode) {
    if mode.fills() {
        surface.set_fill_color(state.fill_color);
    }
    if !env.painting {
        return;
    }
    if mode.fills() {
        surface.fill();
    }
    if mode.strokes() {
        surface.stroke();
    }
}

fn round_rect_path(surface: &mut dyn Surface, r: f64, rect: DeviceRect) {
    let DeviceRect {
        x,
        y,
        width: w,
        height: h,
    } = rect;
    surface.begin_path();
    surface.move_to(x + r, y);
    surface.arc_to(x + w, y, x + w, y + r, r);
    surface.arc_to(x + w, y + h, x + w - r, y + h, r);
    surface.arc_to(x, y + h, x, y + h - r, r);
    surface.arc_to(x, y, x + r, y, r);
    surface.close_path();
}

fn ellipse_path(surface: &mut dyn Surface, rect: DeviceRect) {
    let DeviceRect {
        x,
        y,
        width: w,
        height: h,
    } = rect;
    let ox = (w / 2.0) * KAPPA;
    let oy = (h / 2.0) * KAPPA;
    let xe = x + w;
    let ye = y + h;
    let xm = x + w / 2.0;
    let ym = y + h / 2.0;
    surface.begin_path();
    surface.move_to(x, ym);
    surface.bezier_curve_to(x, ym - oy, xm - ox, y, xm, y);
    surface.bezier_curve_to(xm + ox, y, xe, ym - oy, xe, ym);
    surface.bezier_curve_to(xe, ym + oy, xm + ox, ye, xm, ye);
    surface.bezier_curve_to(xm - ox, ye, x, ym + oy, x, ym);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::instruction::decode_all;
    use crate::paper::model::Color;
    use crate::paper::surface::{DrawCall, RecordingSurface};

    fn run(src: &str, env: PassEnv) -> (RenderState, Vec<DrawCall>) {
        let mut state = RenderState::default();
        let mut surface = RecordingSurface::new(100, 100);
        for instruction in decode_all(src) {
            assert!(execute(&mut state, env, &mut surface, &instruction));
        }
        (state, surface.take())
    }

    const PAINT: PassEnv = PassEnv {
        ratio: 1.0,
        painting: true,
    };

    #[test]
    fn hairline_width_becomes_ratio() {
        let (state, calls) = run(
            "w0.5;",
            PassEnv {
                ratio: 2.0,
                painting: true,
            },
        );
        assert_eq!(state.line_width, 2.0);
        assert_eq!(calls, vec![DrawCall::LineWidth(2.0)]);
        let (state, _) = run("w3;", PAINT);
        assert_eq!(state.line_width, 3.0);
    }

    #[test]
    fn axis_aligned_lines_snap_at_ratio_one() {
        let (_, calls) = run("L10,5,10,50;", PAINT);
        assert_eq!(calls[1], DrawCall::MoveTo(9.5, 4.5));
        assert_eq!(calls[2], DrawCall::LineTo(9.5, 49.5));

        let (_, calls) = run("w2;L10,5,10,50;", PAINT);
        assert!(calls.contains(&DrawCall::MoveTo(10.0, 5.0)));

        let (_, calls) = run("L0,0,10,10;", PAINT);
        assert!(calls.contains(&DrawCall::MoveTo(0.0, 0.0)));

        let (_, calls) = run(
            "L10,5,10,50;",
            PassEnv {
                ratio: 2.0,
                painting: true,
            },
        );
        assert!(calls.contains(&DrawCall::MoveTo(10.0, 5.0)));
    }

    #[test]
    fn fill_uses_fill_color_and_text_uses_text_color() {
        let (_, calls) = run("CFF0000;c00FF00;RF0,0,5,5;T1,2,2,hi;", PAINT);
        assert_eq!(
            calls,
            vec![
                DrawCall::FillColor(Color::rgb(255, 0, 0)),
                DrawCall::FillRect(DeviceRect::new(0.0, 0.0, 5.0, 5.0)),
                DrawCall::FillColor(Color::rgb(0, 255, 0)),
                DrawCall::FillText {
                    text: "hi".into(),
                    x: 1.0,
                    y: 2.0,
                    max_width: None
                },
                DrawCall::FillColor(Color::rgb(255, 0, 0)),
            ]
        );
    }

    #[test]
    fn deferred_pass_changes_state_without_drawing() {
        let env = PassEnv {
            ratio: 1.0,
            painting: false,
        };
        let (state, calls) = run("s0000FF;R1,1,5,5;L0,0,4,0;EP0,0,4,4;T0,0,1,x;", env);
        assert_eq!(state.stroke_color, Color::rgb(0, 0, 255));
        assert!(!calls.iter().any(|c| matches!(
            c,
            DrawCall::StrokeRect(_)
                | DrawCall::Stroke
                | DrawCall::Fill
                | DrawCall::FillText { .. }
                | DrawCall::BeginPath
        )));
    }

    #[test]
    fn round_rect_uses_four_arcs() {
        let (_, calls) = run("rS2,0,0,10,8;", PAINT);
        let arcs = calls
            .iter()
            .filter(|c| matches!(c, DrawCall::ArcTo(..)))
            .count();
        assert_eq!(arcs, 4);
        assert_eq!(calls[1], DrawCall::MoveTo(2.0, 0.0));
        assert_eq!(calls.last(), Some(&DrawCall::Stroke));
    }

    #[test]
    fn ellipse_uses_kappa_handles() {
        let (_, calls) = run("E0,0,20,10;", PAINT);
        assert_eq!(calls[1], DrawCall::MoveTo(0.0, 5.0));
        assert_eq!(
            calls[2],
            DrawCall::BezierTo(0.0, 5.0 - 5.0 * KAPPA, 10.0 - 10.0 * KAPPA, 0.0, 10.0, 0.0)
        );
        assert_eq!(calls.last(), Some(&DrawCall::Fill));
    }

    #[test]
    fn transform_accumulates_and_resets() {
        let (state, _) = run("tr10,0,0;tr5,5,0;", PAINT);
        assert_eq!(state.transform.apply(0.0, 0.0), (15.0, 5.0));
        let (state, calls) = run("tr10,0,0;tc;", PAINT);
        assert!(state.transform.is_identity());
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn document_level_instructions_are_not_handled() {
        let mut state = RenderState::default();
        let mut surface = RecordingSurface::new(10, 10);
        for src in ["Z;", "U", "kg1,1;", "ef;"] {
            let instruction = decode_all(src).remove(0);
            assert!(!execute(&mut state, PAINT, &mut surface, &instruction));
        }
    }
}
