//! Edit decision list (EDL) models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};

/// A single cut, in seconds from the start of the source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    /// Start time in seconds (float)
    pub start: f64,
    /// End time in seconds (float)
    pub end: f64,
}

impl Segment {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Length of the cut in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Check `0 <= start < end` with finite bounds.
    pub fn validate(&self, index: usize) -> ValidationResult<()> {
        let valid = self.start.is_finite()
            && self.end.is_finite()
            && self.start >= 0.0
            && self.end > self.start;

        if valid {
            Ok(())
        } else {
            Err(ValidationError::InvalidSegment {
                index,
                start: self.start,
                end: self.end,
            })
        }
    }
}

/// Named, ordered list of cuts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Edl {
    /// Name of the EDL, used as the output file stem
    pub name: String,
    /// Ordered cut segments
    pub segments: Vec<Segment>,
}

impl Edl {
    pub fn new(name: impl Into<String>, segments: Vec<Segment>) -> Self {
        Self {
            name: name.into(),
            segments,
        }
    }

    /// Total duration of all segments in seconds.
    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(Segment::duration).sum()
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if self.segments.is_empty() {
            return Err(ValidationError::NoSegments);
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        // The name becomes an output file stem inside the staging area
        if self.name.contains(['/', '\\']) || matches!(self.name.as_str(), "." | "..") {
            return Err(ValidationError::InvalidName(self.name.clone()));
        }
        for (index, segment) in self.segments.iter().enumerate() {
            segment.validate(index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_validation() {
        assert!(Segment::new(0.0, 5.0).validate(0).is_ok());
        assert!(Segment::new(10.0, 12.5).validate(1).is_ok());

        assert_eq!(
            Segment::new(5.0, 5.0).validate(3),
            Err(ValidationError::InvalidSegment {
                index: 3,
                start: 5.0,
                end: 5.0
            })
        );
        assert!(Segment::new(6.0, 2.0).validate(0).is_err());
        assert!(Segment::new(-1.0, 2.0).validate(0).is_err());
        assert!(Segment::new(0.0, f64::NAN).validate(0).is_err());
    }

    #[test]
    fn test_edl_validation() {
        let edl = Edl::new("clip", vec![Segment::new(0.0, 5.0), Segment::new(10.0, 12.0)]);
        assert!(edl.validate().is_ok());
        assert!((edl.total_duration() - 7.0).abs() < 1e-9);

        let empty = Edl::new("clip", vec![]);
        assert_eq!(empty.validate(), Err(ValidationError::NoSegments));

        let unnamed = Edl::new("  ", vec![Segment::new(0.0, 1.0)]);
        assert_eq!(unnamed.validate(), Err(ValidationError::EmptyName));

        for name in ["../../etc/cron.d/x", "/tmp/clip", "a\\b", "..", "."] {
            let edl = Edl::new(name, vec![Segment::new(0.0, 1.0)]);
            assert_eq!(
                edl.validate(),
                Err(ValidationError::InvalidName(name.to_string())),
                "{name}"
            );
        }
        assert!(Edl::new("clip.v2", vec![Segment::new(0.0, 1.0)]).validate().is_ok());
    }

    #[test]
    fn test_edl_deserialize() {
        let edl: Edl =
            serde_json::from_str(r#"{"name":"clip","segments":[{"start":0,"end":5.5}]}"#).unwrap();
        assert_eq!(edl.segments, vec![Segment::new(0.0, 5.5)]);
    }
}
