//! Output size limits.

/// Server-wide maximums for a rendered response.
///
/// A zero in any field means "unbounded"; `normalized` replaces zeros with
/// the type maximum so comparisons are uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraint {
    pub width: u32,
    pub height: u32,
    pub area: u64,
}

impl Constraint {
    pub fn unbounded() -> Self {
        Constraint { width: u32::MAX, height: u32::MAX, area: u64::MAX }
    }

    /// Replace zero fields with the maximum representable value.
    pub fn normalized(self) -> Self {
        Constraint {
            width: if self.width == 0 { u32::MAX } else { self.width },
            height: if self.height == 0 { u32::MAX } else { self.height },
            area: if self.area == 0 { u64::MAX } else { self.area },
        }
    }

    /// True when any limit is below the given image dimensions.
    pub fn smaller_than_any(&self, width: u32, height: u32) -> bool {
        let c = self.normalized();
        c.width < width || c.height < height || c.area < width as u64 * height as u64
    }

    /// True when an output of the given dimensions fits every limit.
    pub fn allows(&self, width: u32, height: u32) -> bool {
        let c = self.normalized();
        width <= c.width && height <= c.height && width as u64 * height as u64 <= c.area
    }
}

impl Default for Constraint {
    fn default() -> Self {
        Constraint::unbounded()
    }
}

// =============================================================================
// Tests
// =============================================================================
