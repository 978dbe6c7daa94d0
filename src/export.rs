use std::fmt::Display;
use std::io::Write;
use std::path::Path;

use crate::device::DeviceId;
use crate::error::Result;
use crate::sample::Sample;

/// Buffered samples of every device attached to one graph, ready to export.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    metric: String,
    fields: Vec<String>,
    devices: Vec<(DeviceId, Vec<Sample>)>,
}

impl Recording {
    pub fn new(metric: &str, fields: &[&str]) -> Recording {
        Recording {
            metric: metric.to_owned(),
            fields: fields.iter().map(|field| field.to_string()).collect(),
            devices: Vec::new(),
        }
    }

    pub fn add_device(&mut self, device: DeviceId, samples: Vec<Sample>) {
        self.devices.push((device, samples));
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn row_count(&self) -> usize {
        self.devices.iter().map(|(_, samples)| samples.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Columns of every row: device, timestamp, then one per field.
    pub fn column_count(&self) -> usize {
        2 + self.fields.len()
    }

    fn rows(&self) -> impl Iterator<Item = (DeviceId, &Sample)> {
        self.devices
            .iter()
            .flat_map(|(device, samples)| samples.iter().map(move |sample| (*device, sample)))
    }

    // missing fields are exported as NaN so every row has the same width
    fn row_values(&self, sample: &Sample) -> impl Iterator<Item = f64> + '_ {
        let sample = *sample;
        (0..self.fields.len()).map(move |field| sample.value(field).unwrap_or(f64::NAN))
    }
}

fn write_csv_row<I, T>(writer: &mut impl Write, items: I) -> std::io::Result<()>
where
    I: Iterator<Item = T>,
    T: Display,
{
    let row = items
        .map(|item| format!("{}", item))
        .reduce(|row, item_string| row + "," + &item_string)
        .unwrap_or_default();

    writer.write_all(row.as_bytes())?;
    writer.write_all(b"\n")?;

    Ok(())
}

pub fn write_csv_to(writer: &mut impl Write, recording: &Recording) -> std::io::Result<()> {
    let header = ["device".to_owned(), "timestamp_us".to_owned()]
        .into_iter()
        .chain(recording.fields().iter().cloned());
    write_csv_row(writer, header)?;

    for (device, sample) in recording.rows() {
        let values = recording.row_values(sample).map(|value| value.to_string());
        let row = [device.0.to_string(), sample.timestamp.to_string()]
            .into_iter()
            .chain(values);
        write_csv_row(writer, row)?;
    }

    Ok(())
}

pub fn write_csv(filename: &Path, recording: &Recording) -> Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(filename)?);
    write_csv_to(&mut file, recording)?;

    let file = file.into_inner().map_err(|err| err.into_error())?;
    file.sync_all()?;

    log::info!(
        "exported {} rows of {} to {}",
        recording.row_count(),
        recording.metric(),
        filename.display()
    );
    Ok(())
}

/// Write as a 2D `f64` array, one row per sample, columns as in [`write_csv`].
pub fn write_npy_to<W: Write>(writer: W, recording: &Recording) -> std::io::Result<()> {
    use npyz::WriterBuilder;

    let mut writer = {
        npyz::WriteOptions::new()
            .default_dtype()
            .shape(&[
                recording.row_count() as u64,
                recording.column_count() as u64,
            ])
            .writer(writer)
            .begin_nd()?
    };

    for (device, sample) in recording.rows() {
        let key = [device.0 as f64, sample.timestamp as f64];
        writer.extend(key.into_iter().chain(recording.row_values(sample)))?;
    }

    writer.finish()?;

    Ok(())
}

pub fn write_npy(filename: &Path, recording: &Recording) -> Result<()> {
    let mut file = std::fs::File::create(filename)?;
    write_npy_to(&mut file, recording)?;
    file.sync_all()?;

    log::info!(
        "exported {} rows of {} to {}",
        recording.row_count(),
        recording.metric(),
        filename.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::error::GraphError;

    fn recording() -> Recording {
        let mut recording = Recording::new("Accelerometer", &["X", "Y"]);
        recording.add_device(
            DeviceId(1),
            vec![Sample::new(10, &[0.5, 1.0]), Sample::new(20, &[0.25, -1.0])],
        );
        recording.add_device(DeviceId(7), vec![Sample::new(15, &[2.0])]);
        recording
    }

    #[test]
    fn csv_has_one_row_per_sample() {
        let mut out = Vec::new();
        write_csv_to(&mut out, &recording()).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "device,timestamp_us,X,Y\n\
             1,10,0.5,1\n\
             1,20,0.25,-1\n\
             7,15,2,NaN\n"
        );
    }

    #[test]
    fn npy_shape_matches_rows_and_columns() {
        let recording = recording();
        let mut out = Cursor::new(Vec::new());
        write_npy_to(&mut out, &recording).unwrap();

        let bytes = out.into_inner();
        let npy = npyz::NpyFile::new(&bytes[..]).unwrap();
        assert_eq!(npy.shape(), &[3, 4]);

        let values: Vec<f64> = npy.into_vec().unwrap();
        assert_eq!(&values[..4], &[1.0, 10.0, 0.5, 1.0]);
        assert_eq!(values[8], 7.0);
        assert!(values[11].is_nan());
    }

    #[test]
    fn empty_recording_only_writes_header() {
        let mut out = Vec::new();
        write_csv_to(&mut out, &Recording::new("Temperature", &["Temperature"])).unwrap();

        assert_eq!(out, b"device,timestamp_us,Temperature\n");
    }

    #[test]
    fn unwritable_path_is_an_io_error() {
        let filename = std::env::temp_dir()
            .join("telemetry-graph-missing-dir")
            .join("nested")
            .join("export.csv");

        assert!(matches!(
            write_csv(&filename, &recording()),
            Err(GraphError::Io(_))
        ));
        assert!(matches!(
            write_npy(&filename.with_extension("npy"), &recording()),
            Err(GraphError::Io(_))
        ));
    }
}
