use shared::{InputFrame, Position};

/// Applies one frame's held directions to `position`.
///
/// Screen coordinates: up decreases y. There is no bounds clamping beyond
/// saturating at the integer limits.
pub fn apply_input(position: Position, frame: &InputFrame, speed: i32) -> Position {
    let mut next = position;
    if frame.up {
        next.y = next.y.saturating_sub(speed);
    }
    if frame.down {
        next.y = next.y.saturating_add(speed);
    }
    if frame.left {
        next.x = next.x.saturating_sub(speed);
    }
    if frame.right {
        next.x = next.x.saturating_add(speed);
    }
    next
}

/// Runs one simulation tick over every frame buffered since the last tick.
///
/// Frames compound in buffer order, so two `right` frames in the same tick
/// move twice as far as one.
pub fn step(position: Position, frames: &[InputFrame], speed: i32) -> Position {
    frames
        .iter()
        .fold(position, |current, frame| apply_input(current, frame, speed))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEED: i32 = 4;

    fn frame(up: bool, down: bool, left: bool, right: bool) -> InputFrame {
        InputFrame::new(up, down, left, right)
    }

    #[test]
    fn test_single_right_frame() {
        let next = step(Position::new(375, 200), &[frame(false, false, false, true)], SPEED);
        assert_eq!(next, Position::new(379, 200));
    }

    #[test]
    fn test_each_direction() {
        let origin = Position::new(100, 100);
        assert_eq!(
            apply_input(origin, &frame(true, false, false, false), SPEED),
            Position::new(100, 96)
        );
        assert_eq!(
            apply_input(origin, &frame(false, true, false, false), SPEED),
            Position::new(100, 104)
        );
        assert_eq!(
            apply_input(origin, &frame(false, false, true, false), SPEED),
            Position::new(96, 100)
        );
        assert_eq!(
            apply_input(origin, &frame(false, false, false, true), SPEED),
            Position::new(104, 100)
        );
    }

    #[test]
    fn test_opposite_directions_cancel() {
        let origin = Position::new(10, 10);
        assert_eq!(
            apply_input(origin, &frame(true, true, true, true), SPEED),
            origin
        );
    }

    #[test]
    fn test_empty_tick_keeps_position() {
        let origin = Position::new(-7, 13);
        assert_eq!(step(origin, &[], SPEED), origin);
    }

    #[test]
    fn test_frames_compound_within_tick() {
        let frames = vec![
            frame(false, false, false, true),
            frame(false, false, false, true),
            frame(true, false, false, true),
            frame(false, true, true, false),
            frame(true, false, false, false),
        ];

        let expected_dx: i32 = frames
            .iter()
            .map(|f| (f.right as i32 - f.left as i32) * SPEED)
            .sum();
        let expected_dy: i32 = frames
            .iter()
            .map(|f| (f.down as i32 - f.up as i32) * SPEED)
            .sum();

        let origin = Position::new(375, 200);
        let next = step(origin, &frames, SPEED);
        assert_eq!(next, Position::new(375 + expected_dx, 200 + expected_dy));
        assert_eq!(next, Position::new(383, 196));
    }

    #[test]
    fn test_all_frame_combinations_sum() {
        let frames: Vec<InputFrame> = (0u8..16)
            .map(|bits| frame(bits & 1 != 0, bits & 2 != 0, bits & 4 != 0, bits & 8 != 0))
            .collect();

        // every direction is held in exactly half of the combinations
        assert_eq!(step(Position::new(0, 0), &frames, SPEED), Position::new(0, 0));
    }

    #[test]
    fn test_saturates_at_integer_limits() {
        let edge = Position::new(i32::MAX, i32::MIN);
        let next = apply_input(edge, &frame(true, false, false, true), SPEED);
        assert_eq!(next, edge);
    }
}
