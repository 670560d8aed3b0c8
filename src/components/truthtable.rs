//! Combinational logic described by a truth table.
//!
//! ```text
//! TRUTHTABLE_START(TTL_7400_NAND, 2, 1, "+A,+B")
//!     TT_HEAD("A,B|Q")
//!     TT_LINE("0,X|1|22")
//!     TT_LINE("X,0|1|22")
//!     TT_LINE("1,1|0|15")
//!     TT_FAMILY("74XX")
//! TRUTHTABLE_END()
//! ```
//!
//! Every line maps an input pattern (`0`, `1` or `X` for don't care) to
//! output levels and per output delays in nanoseconds. Inputs marked `X`
//! that really do not influence the outputs are switched off while the
//! device sits in such a state, so the kernel does not wake it up for
//! changes it would ignore anyway.

use std::sync::Arc;

use super::{Device, DeviceBuilder};
use crate::circuit::{Context, Handler, LogicInput, LogicOutput, Signal, TerminalState};
use crate::error::{NetlistError, Result};
use crate::time::NetlistTime;

/// Largest number of inputs a table may have.
pub const MAX_INPUTS: usize = 16;

/// A truth table as written in the netlist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TruthTableDesc {
    pub name: String,
    pub num_inputs: usize,
    pub num_outputs: usize,
    /// Positional arguments of the device, e.g. `+A,+B`
    pub def_params: String,
    pub head: String,
    pub lines: Vec<String>,
    /// Logic family model
    pub family: String,
}

/// Compiled lookup tables, shared by all instances of a type.
#[derive(Debug)]
pub struct TruthTableData {
    inputs: Vec<String>,
    outputs: Vec<String>,
    /// Output bits per input state
    out_state: Vec<u32>,
    /// Inputs that may be ignored per input state
    ign: Vec<u32>,
    /// Delay per input state and output
    delays: Vec<NetlistTime>,
    family: String,
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',').map(|x| x.trim().to_string()).collect()
}

impl TruthTableDesc {
    pub fn compile(&self) -> Result<Arc<TruthTableData>> {
        let err = |msg: String| NetlistError::truth_table(&self.name, msg);

        let (ins, outs) = self
            .head
            .split_once('|')
            .ok_or_else(|| err(format!("head <{}> needs inputs|outputs", self.head)))?;
        let inputs = split_list(ins);
        let outputs = split_list(outs);
        let ni = inputs.len();
        let no = outputs.len();
        if ni != self.num_inputs || no != self.num_outputs {
            return Err(err(format!(
                "head declares {} inputs and {} outputs, expected {} and {}",
                ni, no, self.num_inputs, self.num_outputs
            )));
        }
        if ni > MAX_INPUTS {
            return Err(err(format!("{} inputs exceed the maximum of {}", ni, MAX_INPUTS)));
        }

        let size = 1usize << ni;
        let mut out_state: Vec<Option<u32>> = vec![None; size];
        let mut line_ign = vec![0u32; size];
        let mut delays = vec![NetlistTime::zero(); size * no];

        for line in &self.lines {
            let fields: Vec<&str> = line.split('|').collect();
            if fields.len() != 3 {
                return Err(err(format!("line <{}> needs inputs|outputs|delays", line)));
            }
            let pattern = split_list(fields[0]);
            let levels = split_list(fields[1]);
            let times = split_list(fields[2]);
            if pattern.len() != ni || levels.len() != no {
                return Err(err(format!("line <{}> does not match the head", line)));
            }

            let mut fixed = 0u32;
            let mut dont_care = 0u32;
            for (i, p) in pattern.iter().enumerate() {
                match p.as_str() {
                    "0" => {}
                    "1" => fixed |= 1 << i,
                    "X" => dont_care |= 1 << i,
                    other => return Err(err(format!("invalid input value <{}> in <{}>", other, line))),
                }
            }

            let mut out = 0u32;
            for (i, l) in levels.iter().enumerate() {
                match l.as_str() {
                    "0" => {}
                    "1" => out |= 1 << i,
                    other => return Err(err(format!("invalid output value <{}> in <{}>", other, line))),
                }
            }

            let t: Vec<NetlistTime> = times
                .iter()
                .map(|s| {
                    s.parse::<i64>()
                        .map(NetlistTime::from_nsec)
                        .map_err(|_| err(format!("invalid delay <{}> in <{}>", s, line)))
                })
                .collect::<Result<_>>()?;
            let t = match t.len() {
                1 => vec![t[0]; no],
                n if n == no => t,
                _ => return Err(err(format!("line <{}> needs 1 or {} delays", line, no))),
            };

            // walk all subsets of the don't care bits
            let mut sub = 0u32;
            loop {
                let state = (fixed | sub) as usize;
                match out_state[state] {
                    Some(prev) if prev != out => {
                        return Err(err(format!("state {:04x} has conflicting outputs", state)));
                    }
                    // overlapping lines agree, the first one wins
                    Some(_) => {}
                    None => {
                        out_state[state] = Some(out);
                        line_ign[state] = dont_care;
                        delays[state * no..(state + 1) * no].copy_from_slice(&t);
                    }
                }
                sub = sub.wrapping_sub(dont_care) & dont_care;
                if sub == 0 {
                    break;
                }
            }
        }

        let out_state = out_state
            .iter()
            .enumerate()
            .map(|(s, o)| o.ok_or_else(|| err(format!("state {:04x} is not defined", s))))
            .collect::<Result<Vec<_>>>()?;

        // An input can only be ignored if no combination of the ignored
        // inputs changes the outputs.
        let ign = (0..size)
            .map(|state| {
                let mask = line_ign[state] as usize;
                let base = state & !mask;
                let mut sub = 0usize;
                loop {
                    if out_state[base | sub] != out_state[state] {
                        return 0;
                    }
                    sub = sub.wrapping_sub(mask) & mask;
                    if sub == 0 {
                        return mask as u32;
                    }
                }
            })
            .collect();

        Ok(Arc::new(TruthTableData {
            inputs,
            outputs,
            out_state,
            ign,
            delays,
            family: self.family.clone(),
        }))
    }
}

impl TruthTableData {
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// Output levels for an input state.
    pub fn outputs_for(&self, state: usize) -> u32 {
        self.out_state[state]
    }

    /// Inputs that need not be watched in an input state.
    pub fn ignore_mask(&self, state: usize) -> u32 {
        self.ign[state]
    }
}

/// A device running a [`TruthTableData`].
#[derive(Debug)]
pub struct TruthTable {
    data: Arc<TruthTableData>,
    inputs: Vec<LogicInput>,
    outputs: Vec<LogicOutput>,
    ign: u32,
}

impl TruthTable {
    pub fn new(b: &mut DeviceBuilder<'_>, data: Arc<TruthTableData>) -> Result<Self> {
        let model = b.param_model("MODEL", data.family())?;
        let family = b.family(b.value_str(model))?;
        b.set_family(family);
        let inputs = data.inputs.iter().map(|n| b.logic_input(n, Handler::DEFAULT)).collect();
        let outputs = data.outputs.iter().map(|n| b.logic_output(n)).collect();
        Ok(Self {
            data,
            inputs,
            outputs,
            ign: 0,
        })
    }

    fn read_state(&self, ctx: &Context<'_>) -> usize {
        self.inputs
            .iter()
            .enumerate()
            .fold(0usize, |s, (i, &inp)| s | ((ctx.input(inp) as usize & 1) << i))
    }

    fn for_each_ignored(&self, mut ign: u32, mut f: impl FnMut(LogicInput)) {
        let mut i = 0;
        while ign != 0 {
            if ign & 1 != 0 {
                f(self.inputs[i]);
            }
            ign >>= 1;
            i += 1;
        }
    }

    /// Evaluate the table. With `DO_OUT` outputs are pushed through the
    /// queue, otherwise they are latched to change at their delay.
    fn process<const DO_OUT: bool>(&mut self, ctx: &mut Context<'_>) {
        // bring back what was switched off, it may have changed meanwhile
        self.for_each_ignored(self.ign, |i| ctx.activate(i));

        let state = self.read_state(ctx);
        let out = self.data.outputs_for(state);
        let no = self.outputs.len();
        let delays = &self.data.delays[state * no..(state + 1) * no];
        for (i, (&q, &delay)) in self.outputs.iter().zip(delays).enumerate() {
            let v: Signal = (out >> i) & 1;
            if DO_OUT {
                ctx.push(q, v, delay);
            } else {
                let at = ctx.time() + delay;
                ctx.set_q_time(q, v, at);
            }
        }

        self.ign = self.data.ignore_mask(state);
        self.for_each_ignored(self.ign, |i| ctx.inactivate(i));
    }
}

impl Device for TruthTable {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.ign = 0;
        for &i in &self.inputs {
            ctx.set_state(i, TerminalState::InputActive);
        }
        let active = self.outputs.iter().filter(|&&q| ctx.is_connected(q)).count();
        ctx.set_active_outputs(active as i32);
    }

    fn update(&mut self, ctx: &mut Context<'_>, _handler: Handler) {
        self.process::<true>(ctx);
    }

    fn inc_active(&mut self, ctx: &mut Context<'_>) {
        if self.inputs.len() > 1 {
            self.process::<false>(ctx);
        }
    }

    /// Single input gates never stop listening.
    fn dec_active(&mut self, ctx: &mut Context<'_>) {
        if self.inputs.len() > 1 {
            for &i in &self.inputs {
                ctx.inactivate(i);
            }
            self.ign = u32::MAX >> (32 - self.inputs.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nand() -> TruthTableDesc {
        TruthTableDesc {
            name: "NAND".into(),
            num_inputs: 2,
            num_outputs: 1,
            def_params: "+A,+B".into(),
            head: "A,B|Q".into(),
            lines: vec!["0,X|1|22".into(), "X,0|1|22".into(), "1,1|0|15".into()],
            family: "74XX".into(),
        }
    }

    #[test]
    fn test_overlapping_lines() {
        // 0,0 is covered by both don't care lines with the same result
        let data = nand().compile().unwrap();
        assert_eq!(data.outputs_for(0b00), 1);
        assert_eq!(data.ignore_mask(0b00), 0b10);
        assert_eq!(data.ignore_mask(0b01), 0b01);

        let mut desc = nand();
        desc.lines.push("0,0|0|22".into());
        let err = desc.compile().unwrap_err();
        assert!(matches!(err, NetlistError::TruthTable { .. }));
    }

    #[test]
    fn test_nand_table() {
        let mut desc = nand();
        desc.lines = vec!["0,X|1|22".into(), "1,0|1|22".into(), "1,1|0|15".into()];
        let data = desc.compile().unwrap();
        assert_eq!(data.outputs_for(0b00), 1);
        assert_eq!(data.outputs_for(0b01), 1);
        assert_eq!(data.outputs_for(0b10), 1);
        assert_eq!(data.outputs_for(0b11), 0);
        assert_eq!(data.delays[0b11], NetlistTime::from_nsec(15));
        // with A low, B does not matter
        assert_eq!(data.ignore_mask(0b00), 0b10);
        assert_eq!(data.ignore_mask(0b10), 0b10);
        assert_eq!(data.ignore_mask(0b01), 0);
    }

    #[test]
    fn test_missing_state_is_an_error() {
        let mut desc = nand();
        desc.lines = vec!["0,X|1|22".into(), "1,1|0|15".into()];
        assert!(desc.compile().is_err());
    }

    #[test]
    fn test_dont_care_input_is_ignored() {
        let desc = TruthTableDesc {
            name: "BUF".into(),
            num_inputs: 2,
            num_outputs: 1,
            head: "A,B|Q".into(),
            lines: vec!["X,0|0|10".into(), "0,1|0|10".into(), "1,1|1|10".into()],
            ..Default::default()
        };
        let data = desc.compile().unwrap();
        assert_eq!(data.ignore_mask(0b00), 0b01);
        assert_eq!(data.ignore_mask(0b01), 0b01);
    }

    #[test]
    fn test_multi_output_delays() {
        let desc = TruthTableDesc {
            name: "HALFADD".into(),
            num_inputs: 2,
            num_outputs: 2,
            head: "A,B|S,C".into(),
            lines: vec![
                "0,0|0,0|10".into(),
                "0,1|1,0|10,20".into(),
                "1,0|1,0|10,20".into(),
                "1,1|0,1|10,20".into(),
            ],
            ..Default::default()
        };
        let data = desc.compile().unwrap();
        assert_eq!(data.outputs_for(0b11), 0b10);
        assert_eq!(data.delays[0b11 * 2 + 1], NetlistTime::from_nsec(20));
        assert_eq!(data.delays[1], NetlistTime::from_nsec(10));
    }

    #[test]
    fn test_head_must_match_declaration() {
        let mut desc = nand();
        desc.num_inputs = 3;
        assert!(desc.compile().is_err());
    }
}
