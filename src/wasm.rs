//! WASM bindings for the netlist engine.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { WasmNetlist } from 'netlist_core';
//!
//! await init();
//!
//! const nl = new WasmNetlist(`
//!   CLOCK(CLK, 1000)
//!   TTL_7404_INVERT(G1, CLK)
//! `);
//! nl.run(0.01);
//! console.log(nl.logic_value("G1.Q"));
//! ```

use wasm_bindgen::prelude::*;

use crate::dsl;
use crate::error::NetlistError;
use crate::netlist::Netlist;
use crate::time::NetlistTime;

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

fn to_js(e: NetlistError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// A built and reset netlist.
#[wasm_bindgen]
pub struct WasmNetlist {
    netlist: Netlist,
}

#[wasm_bindgen]
impl WasmNetlist {
    /// Build the main netlist of `source` and reset it.
    #[wasm_bindgen(constructor)]
    pub fn new(source: &str) -> Result<WasmNetlist, JsValue> {
        Self::with_name(source, None)
    }

    /// Build the block `name` of `source` and reset it.
    #[wasm_bindgen]
    pub fn with_name(source: &str, name: Option<String>) -> Result<WasmNetlist, JsValue> {
        let mut netlist = dsl::load(source, name.as_deref()).map_err(to_js)?;
        netlist.reset();
        Ok(WasmNetlist { netlist })
    }

    /// Simulate `seconds` further.
    #[wasm_bindgen]
    pub fn run(&mut self, seconds: f64) {
        self.netlist.process_queue(NetlistTime::from_fp(seconds));
    }

    /// Current simulation time in seconds.
    #[wasm_bindgen(getter)]
    pub fn time(&self) -> f64 {
        self.netlist.time().as_fp()
    }

    /// Set a parameter, e.g. `set_param("I1.IN", "1")`.
    #[wasm_bindgen]
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<(), JsValue> {
        self.netlist.set_param(name, value).map_err(to_js)
    }

    /// Voltage on the net of a terminal, `undefined` if there is none.
    #[wasm_bindgen]
    pub fn analog_value(&self, terminal: &str) -> Option<f64> {
        self.netlist.analog_value(terminal)
    }

    /// Logic level on the net of a terminal.
    #[wasm_bindgen]
    pub fn logic_value(&self, terminal: &str) -> Option<u32> {
        self.netlist.logic_value(terminal)
    }

    /// Samples of a `LOG` device as interleaved `time, value` pairs.
    #[wasm_bindgen]
    pub fn log_samples(&self, device: &str) -> Option<Vec<f64>> {
        let channel = self.netlist.logs().iter().find(|c| c.name == device)?;
        Some(
            channel
                .samples
                .iter()
                .flat_map(|&(t, v)| [t.as_fp(), v])
                .collect(),
        )
    }
}

/// Get the library version.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
