//! Recorded marker sessions.
//!
//! A session is a CSV file with one row per detected marker per frame. Frames
//! without markers are written as a single row with an empty `marker_id`.
//! Poses are stored as Rodrigues rotation + translation in the unit of the
//! marker length used while recording.
//!
//! ```text
//! # frame,timestamp_ns,width,height,image,marker_id,c0x,c0y,...,c3y,rx,ry,rz,tx,ty,tz
//! 0,0,1920,1080,frames/000000.png,3,812.5,400.1,...,0.01,-0.02,0.0,-40.0,5.0,310.0
//! 1,33333333,1920,1080,,,,,,,,,,,,,,,,
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use csv::ReaderBuilder;
use nalgebra::{Point2, Vector3};
use serde::Deserialize;

use crate::camera::FrameSeq;
use crate::geometry::Pose;

#[derive(Debug, Deserialize)]
struct RecordRow {
    frame: FrameSeq,
    timestamp_ns: u64,
    width: u32,
    height: u32,
    image: Option<String>,
    marker_id: Option<i32>,
    c0x: Option<f64>,
    c0y: Option<f64>,
    c1x: Option<f64>,
    c1y: Option<f64>,
    c2x: Option<f64>,
    c2y: Option<f64>,
    c3x: Option<f64>,
    c3y: Option<f64>,
    rx: Option<f64>,
    ry: Option<f64>,
    rz: Option<f64>,
    tx: Option<f64>,
    ty: Option<f64>,
    tz: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMarker {
    pub id: i32,
    pub corners: [Point2<f64>; 4],
    pub pose: Pose,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    pub seq: FrameSeq,
    pub timestamp_ns: u64,
    pub width: u32,
    pub height: u32,
    /// Image file for this frame, relative to the session file.
    pub image: Option<PathBuf>,
    pub markers: Vec<RecordedMarker>,
}

#[derive(Debug, Clone)]
pub struct RecordedSession {
    pub frames: Vec<RecordedFrame>,
    /// Marker side length the poses were estimated with.
    pub marker_length_mm: f64,
}

impl RecordedSession {
    pub fn load<P: AsRef<Path>>(path: P, marker_length_mm: f64) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mut session = Self::from_reader(file, marker_length_mm)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        // Resolve image paths against the session's directory.
        if let Some(base) = path.parent() {
            for frame in &mut session.frames {
                if let Some(image) = frame.image.take() {
                    frame.image = Some(base.join(image));
                }
            }
        }
        Ok(session)
    }

    pub fn from_reader<R: Read>(reader: R, marker_length_mm: f64) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut frames: Vec<RecordedFrame> = Vec::new();
        for (line, row) in rdr.deserialize::<RecordRow>().enumerate() {
            let row = row.with_context(|| format!("record {}", line + 1))?;

            let starts_new_frame = frames.last().is_none_or(|f| f.seq != row.frame);
            if starts_new_frame {
                if let Some(last) = frames.last() {
                    if row.frame < last.seq {
                        bail!(
                            "record {}: frame {} appears after frame {}",
                            line + 1,
                            row.frame,
                            last.seq
                        );
                    }
                }
                frames.push(RecordedFrame {
                    seq: row.frame,
                    timestamp_ns: row.timestamp_ns,
                    width: row.width,
                    height: row.height,
                    image: row.image.as_ref().filter(|s| !s.is_empty()).map(PathBuf::from),
                    markers: Vec::new(),
                });
            }

            let Some(frame) = frames.last_mut() else {
                continue;
            };
            if frame.width != row.width || frame.height != row.height {
                bail!(
                    "record {}: frame {} changes resolution mid-frame",
                    line + 1,
                    row.frame
                );
            }
            if let Some(marker) = parse_marker(&row).with_context(|| format!("record {}", line + 1))? {
                frame.markers.push(marker);
            }
        }

        Ok(Self {
            frames,
            marker_length_mm,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn parse_marker(row: &RecordRow) -> Result<Option<RecordedMarker>> {
    let Some(id) = row.marker_id else {
        return Ok(None);
    };
    let field = |v: Option<f64>, name: &str| {
        v.with_context(|| format!("marker {} is missing {}", id, name))
    };
    let corners = [
        Point2::new(field(row.c0x, "c0x")?, field(row.c0y, "c0y")?),
        Point2::new(field(row.c1x, "c1x")?, field(row.c1y, "c1y")?),
        Point2::new(field(row.c2x, "c2x")?, field(row.c2y, "c2y")?),
        Point2::new(field(row.c3x, "c3x")?, field(row.c3y, "c3y")?),
    ];
    let rvec = Vector3::new(field(row.rx, "rx")?, field(row.ry, "ry")?, field(row.rz, "rz")?);
    let tvec = Vector3::new(field(row.tx, "tx")?, field(row.ty, "ty")?, field(row.tz, "tz")?);
    Ok(Some(RecordedMarker {
        id,
        corners,
        pose: Pose::from_rvec_tvec(rvec, tvec),
    }))
}
