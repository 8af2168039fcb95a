use js_sys::Reflect;
use serde::{Deserialize, Serialize};
use std::io;
use wasm_bindgen::prelude::wasm_bindgen;
use wasm_bindgen::JsValue;
use web_sys::console;

#[wasm_bindgen]
extern "C" {
    static performance: web_sys::Performance;

    fn postMessage(value: &JsValue);
}

pub fn now() -> f64 {
    performance.now()
}

#[derive(Deserialize)]
#[serde(tag = "cmd")]
pub enum Request {
    RunSweep {
        k_min: usize,
        k_max: usize,
        option_count: usize,
        trial_count: Option<u32>,
        seed: Option<u64>,
    },
}

#[derive(Serialize)]
#[serde(tag = "cmd")]
pub enum Reply {
    UpdateStatus { message: String, progress: f64 },
    ReportSweep { rows: Vec<crate::SweepRow> },
}

impl Reply {
    pub fn post(&self) {
        match JsValue::from_serde(self) {
            Ok(value) => postMessage(&value),
            Err(err) => log(&format!("unserializable reply: {}", err)),
        }
    }
}

#[wasm_bindgen]
pub fn init() {
    console_error_panic_hook::set_once();
}

#[wasm_bindgen]
pub fn onmessage(e: &JsValue) {
    let result = Reflect::get(e, &"data".into())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "message has no data"))
        .and_then(|data| handle_message(&data));
    if let Err(err) = result {
        update_status(format!("Error: {}", err));
    }
}

fn handle_message(data: &JsValue) -> io::Result<()> {
    match data.into_serde()? {
        Request::RunSweep {
            k_min,
            k_max,
            option_count,
            trial_count,
            seed,
        } => {
            let sweep = crate::Sweep {
                k_min,
                k_max,
                option_count,
                trial_count: trial_count.unwrap_or(crate::TRIAL_COUNT),
                seed,
            };
            let rows = {
                let _timer = Timer::from("sweep");
                sweep.run(
                    &mut |progress, message| {
                        update_progress(format!("Evaluating... {}", message), progress)
                    },
                    &ConsoleLog,
                )?
            };
            Reply::ReportSweep { rows }.post();
            update_status(format!("Done!"));
            Ok(())
        }
    }
}

pub fn log(message: &str) {
    console::log_1(&message.into());
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleLog;

impl crate::Log for ConsoleLog {
    fn log(&self, message: &str) {
        log(message.trim_start_matches("\x1b[2K\r").trim_end());
    }
}

pub fn update_status(message: String) {
    update_progress(message, f64::NAN);
}

pub fn update_progress(message: String, progress: f64) {
    Reply::UpdateStatus { message, progress }.post();
}

#[derive(Debug)]
pub struct Timer {
    name: &'static str,
}

impl From<&'static str> for Timer {
    fn from(name: &'static str) -> Self {
        console::time_with_label(name);
        Self { name }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        console::time_end_with_label(self.name);
    }
}
