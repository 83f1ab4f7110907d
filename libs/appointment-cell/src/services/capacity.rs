use doctor_cell::models::SlotLabel;

/// Concurrent bookings allowed per hour of slot width.
pub const APPOINTMENTS_PER_HOUR: f64 = 5.0;

/// Smallest capacity any slot gets, and the fallback for unreadable labels.
pub const MIN_APPOINTMENTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotCapacity {
    pub max_appointments: u32,
    pub duration_hours: f64,
}

impl SlotCapacity {
    const DEFAULT: SlotCapacity = SlotCapacity {
        max_appointments: MIN_APPOINTMENTS,
        duration_hours: 1.0,
    };
}

/// Capacity of a slot, computed from the label exactly as it was requested
/// (`09:00`, `09:00-11:00`, `09:00:00-11:00:00`). A bare time is a one-hour
/// slot; anything unreadable falls back to the minimum.
pub fn slot_capacity(label: &SlotLabel) -> SlotCapacity {
    let Some((start, end)) = label.range_parts() else {
        return SlotCapacity::DEFAULT;
    };

    let (Some((start_hour, start_minute)), Some((end_hour, end_minute))) =
        (hour_and_minute(start), hour_and_minute(end))
    else {
        return SlotCapacity::DEFAULT;
    };

    let duration_hours =
        f64::from(end_hour - start_hour) + f64::from(end_minute - start_minute) / 60.0;
    let computed = (duration_hours * APPOINTMENTS_PER_HOUR).floor();

    if !computed.is_finite() || computed < f64::from(MIN_APPOINTMENTS) {
        return SlotCapacity {
            max_appointments: MIN_APPOINTMENTS,
            duration_hours,
        };
    }

    SlotCapacity {
        // float-to-int casts saturate
        max_appointments: computed as u32,
        duration_hours,
    }
}

/// `HH[:MM[:SS]]`. The hour must parse; an absent or unreadable minute is 0.
fn hour_and_minute(text: &str) -> Option<(i32, i32)> {
    let mut parts = text.trim().split(':');
    let hour = parts.next()?.trim().parse::<i32>().ok()?;
    let minute = parts
        .next()
        .and_then(|minute| minute.trim().parse::<i32>().ok())
        .unwrap_or(0);
    Some((hour, minute))
}
