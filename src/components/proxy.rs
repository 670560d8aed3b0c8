//! Devices inserted by the setup where logic and analog terminals meet.
//!
//! A logic output driving analog terminals gets a [`DigitalToAnalog`]
//! proxy, a logic input listening to an analog net gets an
//! [`AnalogToDigital`] proxy. Both use the logic family of the terminal
//! they stand in for.

use super::twoterm::TwoTerm;
use super::{Device, DeviceBuilder};
use crate::circuit::{AnalogInput, Context, Handler, LogicFamily, LogicInput, LogicOutput, Signal};
use crate::error::Result;
use crate::time::NetlistTime;

/// Drives an analog net from a logic signal through the family's output
/// resistance.
#[derive(Debug)]
pub struct DigitalToAnalog {
    input: LogicInput,
    rv: TwoTerm,
    family: LogicFamily,
    last_state: Option<Signal>,
}

impl DigitalToAnalog {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let family = b.logic_family();
        let input = b.logic_input("I", Handler::DEFAULT);
        let rv = TwoTerm::with_names(b, "RV.1", "RV.2");
        b.alias("Q", "RV.1");
        b.connect_to("RV.2", "GND");
        Ok(Self {
            input,
            rv,
            family,
            last_state: None,
        })
    }

    fn drive(&self, ctx: &mut Context<'_>, state: Signal) {
        let high = state != 0;
        let g = 1.0 / self.family.output_r(high);
        self.rv.set_g_v_i(ctx, g, self.family.output_v(high), 0.0);
    }
}

impl Device for DigitalToAnalog {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.last_state = None;
        self.drive(ctx, 0);
    }

    fn update(&mut self, ctx: &mut Context<'_>, _handler: Handler) {
        let state = ctx.input(self.input);
        if self.last_state != Some(state) {
            self.last_state = Some(state);
            self.rv.change_state(ctx);
            self.drive(ctx, state);
        }
    }
}

/// Converts an analog voltage to a logic level with the family's
/// thresholds. Between the thresholds the output keeps its value.
#[derive(Debug)]
pub struct AnalogToDigital {
    input: AnalogInput,
    q: LogicOutput,
    family: LogicFamily,
}

impl AnalogToDigital {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let family = b.logic_family();
        Ok(Self {
            input: b.analog_input("I", Handler::DEFAULT),
            q: b.logic_output("Q"),
            family,
        })
    }

    /// New logic level for `v`, or `None` inside the hysteresis band.
    pub fn level(family: &LogicFamily, v: f64) -> Option<Signal> {
        if v > family.high_thresh_v() {
            Some(1)
        } else if v < family.low_thresh_v() {
            Some(0)
        } else {
            None
        }
    }
}

impl Device for AnalogToDigital {
    fn update(&mut self, ctx: &mut Context<'_>, _handler: Handler) {
        if let Some(q) = Self::level(&self.family, ctx.analog(self.input)) {
            ctx.push(self.q, q, NetlistTime::from_nsec(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::tests::build;

    #[test]
    fn test_ttl_thresholds() {
        let ttl = LogicFamily::ttl();
        assert_eq!(AnalogToDigital::level(&ttl, 0.2), Some(0));
        assert_eq!(AnalogToDigital::level(&ttl, 1.5), None);
        assert_eq!(AnalogToDigital::level(&ttl, 3.0), Some(1));
    }

    #[test]
    fn test_cmos_thresholds() {
        let cmos = LogicFamily::cd4xxx();
        assert_eq!(AnalogToDigital::level(&cmos, 1.4), Some(0));
        assert_eq!(AnalogToDigital::level(&cmos, 2.5), None);
        assert_eq!(AnalogToDigital::level(&cmos, 3.6), Some(1));
    }

    #[test]
    fn test_d_to_a_grounds_its_return_pole() {
        let (state, _, built) = build("PROXY_DA", "P1", &[]).unwrap();
        assert!(state.find_terminal("P1.I").is_some());
        assert_eq!(built.net_links, vec![("P1.RV.2".to_string(), "GND".to_string())]);
        assert!(built.aliases.iter().any(|(a, t)| a == "P1.Q" && t == "P1.RV.1"));
    }
}
