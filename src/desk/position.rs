use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    #[error("desk height range has not been calibrated")]
    Uncalibrated,

    #[error("desk height range is inconsistent (min above max)")]
    Inconsistent,
}

/// Maps a height onto the calibrated `min..=max` range as a percentage.
///
/// Heights outside the range clamp to 0 or 100, and the endpoints map to
/// exactly 0 and 100. A range whose max is zero has never been reported by
/// the desk, and a range with min above max is a calibration error; both
/// yield a [`RangeError`] instead of a number.
pub fn calculate_position(height: f64, min: f64, max: f64) -> Result<u8, RangeError> {
    if max == 0.0 {
        return Err(RangeError::Uncalibrated);
    }

    if min > max {
        return Err(RangeError::Inconsistent);
    }

    // Endpoints are exact, the division below can land a hair under 100 at max.
    // A zero-width range reads as 0 at its single point.
    if height <= min {
        return Ok(0);
    }

    if height >= max {
        return Ok(100);
    }

    let position = ((height - min) * 100.0 / (max - min)).floor();

    Ok(position.clamp(0.0, 100.0) as u8)
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    Decreasing,
    Increasing,
    Stopped,
}

/// Direction of travel derived from where the desk is versus where it was told to go.
pub fn position_state(current_height: f64, target_height: f64) -> PositionState {
    if current_height < target_height {
        PositionState::Increasing
    } else if current_height > target_height {
        PositionState::Decreasing
    } else {
        PositionState::Stopped
    }
}
