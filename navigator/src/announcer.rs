//! Voice announcement thresholds for the upcoming maneuver.
//!
//! For a distance `d` the *applicable* threshold is the smallest one whose
//! band contains `d` (`d <= 500`, `d <= 200`, `d <= 50`, `d < 10`). It is
//! spoken if it has not been spoken yet for the current maneuver; speaking it
//! also marks every larger threshold as spoken, since those were passed.
//! Nothing else is ever spoken, so a jump across several thresholds yields the
//! nearest one only and nothing repeats.
//!
//! A maneuver is identified by its step index and instruction, so two
//! consecutive steps with the same text are announced separately.

/// Thresholds in descending order.
const THRESHOLDS: [Threshold; 4] = [
    Threshold::Meters500,
    Threshold::Meters200,
    Threshold::Meters50,
    Threshold::Now,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    Meters500,
    Meters200,
    Meters50,
    Now,
}

impl Threshold {
    pub fn meters(self) -> f64 {
        match self {
            Threshold::Meters500 => 500.0,
            Threshold::Meters200 => 200.0,
            Threshold::Meters50 => 50.0,
            Threshold::Now => 10.0,
        }
    }

    pub fn phrase(self, instruction: &str) -> String {
        match self {
            Threshold::Meters500 => format!("In 500 meters, {instruction}"),
            Threshold::Meters200 => format!("In 200 meters, {instruction}"),
            Threshold::Meters50 => format!("In 50 meters, {instruction}"),
            Threshold::Now => format!("{instruction} now"),
        }
    }

    fn contains(self, distance: f64) -> bool {
        match self {
            Threshold::Now => distance < self.meters(),
            Threshold::Meters500 | Threshold::Meters200 | Threshold::Meters50 => {
                distance <= self.meters()
            }
        }
    }

    /// Smallest threshold whose band contains `distance`.
    fn applicable(distance: f64) -> Option<(usize, Threshold)> {
        if !distance.is_finite() {
            return None;
        }
        THRESHOLDS
            .iter()
            .copied()
            .enumerate()
            .rev()
            .find(|(_, threshold)| threshold.contains(distance))
    }
}

const NOW_SLOT: usize = THRESHOLDS.len() - 1;

#[derive(Debug, Clone, Default)]
pub struct ProgressiveAnnouncer {
    maneuver: Option<(usize, String)>,
    spoken: [bool; THRESHOLDS.len()],
}

impl ProgressiveAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the text to speak for this update, if any.
    pub fn announce(
        &mut self,
        step_index: usize,
        instruction: &str,
        distance_to_maneuver_m: f64,
    ) -> Option<String> {
        if !self.is_current(step_index, instruction) {
            self.maneuver = Some((step_index, instruction.to_owned()));
            self.spoken = [false; THRESHOLDS.len()];
        }

        let (slot, threshold) = Threshold::applicable(distance_to_maneuver_m)?;
        if self.spoken[slot] {
            return None;
        }
        for passed in &mut self.spoken[..=slot] {
            *passed = true;
        }
        Some(threshold.phrase(instruction))
    }

    /// The maneuver of `step_index` was passed. Returns its "now" cue when
    /// this announcer was tracking it and had not spoken it yet.
    pub fn complete(&mut self, step_index: usize, instruction: &str) -> Option<String> {
        if !self.is_current(step_index, instruction) || self.spoken[NOW_SLOT] {
            return None;
        }
        self.spoken = [true; THRESHOLDS.len()];
        Some(Threshold::Now.phrase(instruction))
    }

    pub fn reset(&mut self) {
        self.maneuver = None;
        self.spoken = [false; THRESHOLDS.len()];
    }

    fn is_current(&self, step_index: usize, instruction: &str) -> bool {
        self.maneuver
            .as_ref()
            .is_some_and(|(index, text)| *index == step_index && text == instruction)
    }
}
