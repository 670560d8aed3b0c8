//! Bipolar PROMs and EPROMs.
//!
//! The content comes from the binary `ROM` parameter, addressed by the
//! `A` inputs with `A0` (or `A1`) as the least significant bit. Addresses
//! beyond the data read as 0.
//!
//! Outputs are tristate. A disabled output releases its net, which then
//! floats high like an open TTL input. `FORCE_TRISTATE_LOGIC` keeps the
//! outputs driven whatever the enables say.

use super::{Device, DeviceBuilder};
use crate::circuit::{AnalogInput, Context, Handler, LogicInput, LogicOutput, ParamBool, ParamBytes, Signal};
use crate::error::Result;
use crate::time::NetlistTime;

const ADDR: Handler = Handler(0);

/// Level a released output net settles at.
const FLOAT_LEVEL: Signal = 1;

/// Output with an off state.
#[derive(Debug, Clone, Copy)]
struct TristateOutput {
    q: LogicOutput,
    tristate: bool,
    last: Signal,
    force_logic: bool,
}

impl TristateOutput {
    fn new(q: LogicOutput) -> Self {
        Self {
            q,
            tristate: false,
            last: 0,
            force_logic: false,
        }
    }

    fn reset(&mut self, force_logic: bool) {
        self.tristate = false;
        self.last = 0;
        self.force_logic = force_logic;
    }

    fn push(&mut self, ctx: &mut Context<'_>, v: Signal, delay: NetlistTime) {
        if !self.tristate {
            ctx.push(self.q, v, delay);
        }
        self.last = v;
    }

    fn set_tristate(&mut self, ctx: &mut Context<'_>, off: bool, delay: NetlistTime) {
        if !self.force_logic && off != self.tristate {
            let v = if off { FLOAT_LEVEL } else { self.last };
            ctx.push(self.q, v, delay);
            self.tristate = off;
        }
    }
}

fn read_inputs(ctx: &Context<'_>, inputs: &[LogicInput]) -> usize {
    inputs
        .iter()
        .enumerate()
        .fold(0, |acc, (i, &a)| acc | (ctx.input(a) as usize) << i)
}

fn read_rom(ctx: &Context<'_>, rom: ParamBytes, addr: usize) -> Signal {
    ctx.param_bytes(rom)
        .and_then(|d| d.get(addr).copied())
        .map(Signal::from)
        .unwrap_or(0)
}

/// Pinout and timing of a PROM type.
#[derive(Debug)]
pub struct PromDesc {
    pub address_width: usize,
    pub data_width: usize,
    /// First output is `O0` or `O1`
    pub data_name_offset: usize,
    /// Chip enable inputs, active when they match `ce_mask`
    pub chip_enables: &'static [&'static str],
    pub ce_mask: usize,
    /// Enable delay per chip enable input
    pub ce_time: &'static [NetlistTime],
    pub access_time: NetlistTime,
}

/// 32x8, used as 256 bits.
pub const PROM_82S123: PromDesc = PromDesc {
    address_width: 5,
    data_width: 8,
    data_name_offset: 1,
    chip_enables: &["CEQ"],
    ce_mask: 0,
    ce_time: &[NetlistTime::from_nsec(35)],
    access_time: NetlistTime::from_nsec(45),
};

/// 256x4.
pub const PROM_82S126: PromDesc = PromDesc {
    address_width: 8,
    data_width: 4,
    data_name_offset: 1,
    chip_enables: &["CE1Q", "CE2Q"],
    ce_mask: 0,
    ce_time: &[NetlistTime::from_nsec(25), NetlistTime::from_nsec(25)],
    access_time: NetlistTime::from_nsec(40),
};

/// 256x4, outputs numbered from `O0`.
pub const PROM_74S287: PromDesc = PromDesc {
    data_name_offset: 0,
    ce_time: &[NetlistTime::from_nsec(15), NetlistTime::from_nsec(15)],
    access_time: NetlistTime::from_nsec(35),
    ..PROM_82S126
};

/// 2048x8. `CE1Q` is chip enable, `CE2Q` output enable.
pub const EPROM_2716: PromDesc = PromDesc {
    address_width: 11,
    data_width: 8,
    data_name_offset: 0,
    chip_enables: &["CE1Q", "CE2Q"],
    ce_mask: 0,
    ce_time: &[NetlistTime::from_nsec(450), NetlistTime::from_nsec(100)],
    access_time: NetlistTime::from_nsec(450),
};

#[derive(Debug)]
pub struct Prom {
    desc: &'static PromDesc,
    a: Vec<LogicInput>,
    ce: Vec<LogicInput>,
    o: Vec<TristateOutput>,
    rom: ParamBytes,
    force_logic: ParamBool,
    enabled: bool,
    _vcc: AnalogInput,
    _gnd: AnalogInput,
}

impl Prom {
    pub fn new(b: &mut DeviceBuilder<'_>, desc: &'static PromDesc) -> Result<Self> {
        let rom = b.param_bytes("ROM")?;
        let force_logic = b.param_bool("FORCE_TRISTATE_LOGIC", false)?;
        let a = (0..desc.address_width)
            .map(|i| b.logic_input(&format!("A{}", i), ADDR))
            .collect();
        let ce = desc
            .chip_enables
            .iter()
            .enumerate()
            .map(|(i, pin)| b.logic_input(pin, Handler(1 + i as u16)))
            .collect();
        let o = (0..desc.data_width)
            .map(|i| TristateOutput::new(b.logic_output(&format!("O{}", i + desc.data_name_offset))))
            .collect();
        Ok(Self {
            desc,
            a,
            ce,
            o,
            rom,
            force_logic,
            enabled: true,
            _vcc: b.analog_input_passive("VCC"),
            _gnd: b.analog_input_passive("GND"),
        })
    }

    fn push_data(&mut self, ctx: &mut Context<'_>) {
        let v = read_rom(ctx, self.rom, read_inputs(ctx, &self.a));
        let delay = self.desc.access_time;
        for (i, o) in self.o.iter_mut().enumerate() {
            o.push(ctx, (v >> i) & 1, delay);
        }
    }
}

impl Device for Prom {
    fn reset(&mut self, ctx: &mut Context<'_>) {
        self.enabled = true;
        let force = ctx.param_bool(self.force_logic);
        for o in &mut self.o {
            o.reset(force);
        }
    }

    fn update(&mut self, ctx: &mut Context<'_>, handler: Handler) {
        if handler == ADDR {
            if self.enabled {
                self.push_data(ctx);
            }
            return;
        }
        let delay = self.desc.ce_time[usize::from(handler.0 - 1)];
        self.enabled = read_inputs(ctx, &self.ce) == self.desc.ce_mask;
        for o in &mut self.o {
            o.set_tristate(ctx, !self.enabled, delay);
        }
        self.push_data(ctx);
    }
}

const MK28000_ADDR: Handler = Handler(0);
const MK28000_OE1: Handler = Handler(1);
const MK28000_OE2: Handler = Handler(2);
const MK28000_DELAY: NetlistTime = NetlistTime::from_nsec(600);

/// MK28000: 2048x8 or 4096x4, selected by which output enable is used.
/// `OE1` enables `O1`..`O4`, `OE2` enables `O5`..`O8`. The address is
/// latched while `ARQ` is low.
#[derive(Debug)]
pub struct Mk28000 {
    a: Vec<LogicInput>,
    arq: LogicInput,
    oe1: LogicInput,
    oe2: LogicInput,
    o: Vec<TristateOutput>,
    rom: ParamBytes,
    enable_lo: bool,
    enable_hi: bool,
    latched: Signal,
    _vcc: AnalogInput,
    _gnd: AnalogInput,
}

impl Mk28000 {
    pub fn new(b: &mut DeviceBuilder<'_>) -> Result<Self> {
        let rom = b.param_bytes("ROM")?;
        let a = (1..=11).map(|i| b.logic_input(&format!("A{}", i), MK28000_ADDR)).collect();
        let arq = b.logic_input("ARQ", MK28000_ADDR);
        let oe1 = b.logic_input("OE1", MK28000_OE1);
        let oe2 = b.logic_input("OE2", MK28000_OE2);
        let o = (1..=8)
            .map(|i| TristateOutput::new(b.logic_output(&format!("O{}", i))))
            .collect();
        Ok(Self {
            a,
            arq,
            oe1,
            oe2,
            o,
            rom,
            enable_lo: false,
            enable_hi: false,
            latched: 0,
            _vcc: b.analog_input_passive("VCC"),
            _gnd: b.analog_input_passive("GND"),
        })
    }

    /// Drive one nibble, `hi` selects `O5`..`O8`.
    fn push_nibble(&mut self, ctx: &mut Context<'_>, hi: bool, enabled: bool, v: Signal) {
        let range = if hi { 4..8 } else { 0..4 };
        for i in range {
            let o = &mut self.o[i];
            o.set_tristate(ctx, !enabled, MK28000_DELAY);
            o.push(ctx, (v >> i) & 1, MK28000_DELAY);
        }
    }
}

impl Device for Mk28000 {
    fn reset(&mut self, _ctx: &mut Context<'_>) {
        self.enable_lo = false;
        self.enable_hi = false;
        self.latched = 0;
        for o in &mut self.o {
            o.reset(false);
        }
    }

    fn update(&mut self, ctx: &mut Context<'_>, handler: Handler) {
        match handler {
            MK28000_OE1 => {
                self.enable_lo = ctx.input(self.oe1) != 0;
                let v = if self.enable_lo { self.latched } else { 0 };
                self.push_nibble(ctx, false, self.enable_lo, v);
            }
            MK28000_OE2 => {
                self.enable_hi = ctx.input(self.oe2) != 0;
                let v = if self.enable_hi { self.latched } else { 0 };
                self.push_nibble(ctx, true, self.enable_hi, v);
            }
            _ => {
                if ctx.input(self.arq) == 0 {
                    self.latched = read_rom(ctx, self.rom, read_inputs(ctx, &self.a));
                }
                let v = if self.enable_lo || self.enable_hi { self.latched } else { 0 };
                let (lo, hi) = (self.enable_lo, self.enable_hi);
                self.push_nibble(ctx, false, lo, v);
                self.push_nibble(ctx, true, hi, v);
            }
        }
    }
}
