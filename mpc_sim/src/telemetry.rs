//! Per-cycle CSV telemetry.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use bicycle_mpc::{Actuation64, ControlOutput, VehicleState64};
use csv::{Writer, WriterBuilder};
use named_vec_ops::NamedVecOps;

/// Writes one row per control cycle: the measured state, the applied actuation and what
/// the solve reported.
pub struct Telemetry<W: Write> {
    writer: Writer<W>,
}

impl Telemetry<File> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, csv::Error> {
        Self::from_writer(File::create(path)?)
    }
}

impl<W: Write> Telemetry<W> {
    pub fn from_writer(inner: W) -> Result<Self, csv::Error> {
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(inner);

        let mut header = vec!["cycle", "time_s"];
        header.extend(VehicleState64::field_names());
        header.extend(Actuation64::field_names());
        header.extend(["solved", "cost", "iterations", "solve_time_s"]);
        writer.write_record(&header)?;

        Ok(Self { writer })
    }

    pub fn record(
        &mut self,
        cycle: usize,
        time_s: f64,
        state: &VehicleState64,
        applied: &Actuation64,
        output: Option<&ControlOutput>,
    ) -> Result<(), csv::Error> {
        let mut row = vec![cycle.to_string(), time_s.to_string()];
        row.extend(state.to_svector().iter().map(f64::to_string));
        row.extend(applied.as_array().iter().map(f64::to_string));

        match output {
            Some(out) => row.extend([
                "true".to_string(),
                out.cost.to_string(),
                out.iterations.to_string(),
                out.solve_time.as_secs_f64().to_string(),
            ]),
            None => row.extend(["false".to_string(), String::new(), String::new(), String::new()]),
        }

        self.writer.write_record(&row)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(inner) => inner,
            Err(_) => panic!("flushing an in-memory writer cannot fail"),
        }
    }
}
