//! Logic families.
//!
//! A family tells the analog/digital proxies where the input thresholds sit
//! and how strongly outputs drive. Thresholds are fractions of the supply.

/// Family type, as given by the `TYPE` key of a family model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyType {
    Custom,
    Ttl,
    Cd4xxx,
    Nmos,
    Cmos,
}

impl FamilyType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CUSTOM" => Some(Self::Custom),
            "TTL" => Some(Self::Ttl),
            "CD4XXX" => Some(Self::Cd4xxx),
            "NMOS" => Some(Self::Nmos),
            "CMOS" => Some(Self::Cmos),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogicFamily {
    pub family_type: FamilyType,
    /// Supply voltage the thresholds refer to
    pub fixed_v: f64,
    pub low_thresh_pcnt: f64,
    pub high_thresh_pcnt: f64,
    /// Output low voltage above ground
    pub low_vo: f64,
    /// Output high voltage below supply
    pub high_vo: f64,
    pub r_low: f64,
    pub r_high: f64,
}

impl LogicFamily {
    pub const fn ttl() -> Self {
        Self {
            family_type: FamilyType::Ttl,
            fixed_v: 5.0,
            low_thresh_pcnt: 0.8 / 5.0,
            high_thresh_pcnt: 2.0 / 5.0,
            low_vo: 0.1,
            high_vo: 1.0,
            r_low: 1.0,
            r_high: 130.0,
        }
    }

    pub const fn cd4xxx() -> Self {
        Self {
            family_type: FamilyType::Cd4xxx,
            fixed_v: 5.0,
            low_thresh_pcnt: 1.5 / 5.0,
            high_thresh_pcnt: 3.5 / 5.0,
            low_vo: 0.05,
            high_vo: 0.05,
            r_low: 500.0,
            r_high: 500.0,
        }
    }

    pub fn low_thresh_v(&self) -> f64 {
        self.low_thresh_pcnt * self.fixed_v
    }

    pub fn high_thresh_v(&self) -> f64 {
        self.high_thresh_pcnt * self.fixed_v
    }

    /// Open circuit output voltage for a logic level.
    pub fn output_v(&self, high: bool) -> f64 {
        if high {
            self.fixed_v - self.high_vo
        } else {
            self.low_vo
        }
    }

    /// Output resistance for a logic level.
    pub fn output_r(&self, high: bool) -> f64 {
        if high {
            self.r_high
        } else {
            self.r_low
        }
    }
}

impl Default for LogicFamily {
    fn default() -> Self {
        Self::ttl()
    }
}
