//! Streaming transform.
//!
//! Streaming panels poll the same query repeatedly and plot each answer at
//! the moment it arrived. Every frame gets a leading `#time` column holding
//! the current instant once per row; `field` optionally narrows the frame
//! to the named columns.

use crate::commands::split_args;
use crate::error::Result;
use crate::frame::{Column, Frame};
use crate::query::QueryModel;

use chrono::{DateTime, Utc};

pub const TIME_COLUMN: &str = "#time";

pub fn apply(frames: Vec<Frame>, qm: &QueryModel) -> Result<Vec<Frame>> {
    apply_at(frames, qm, Utc::now())
}

/// [`apply`] with an explicit sampling instant.
pub fn apply_at(frames: Vec<Frame>, qm: &QueryModel, now: DateTime<Utc>) -> Result<Vec<Frame>> {
    let keep = if qm.field.is_empty() {
        None
    } else {
        Some(split_args(&qm.field, "field is not valid")?)
    };

    Ok(frames
        .into_iter()
        .map(|mut frame| {
            let rows = frame.rows();
            if let Some(keep) = &keep {
                frame.columns.retain(|column| keep.contains(&column.name));
            }
            frame.columns.insert(0, Column::new(TIME_COLUMN, vec![now; rows]));
            frame
        })
        .collect())
}

// ── Tests ──────────────────────────────────────────────────────────
