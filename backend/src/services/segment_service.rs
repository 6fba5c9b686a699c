use crate::error::{PipelineError, PipelineResult};
use crate::models::SegmentView;
use crate::services::store::Store;
use crate::utils::seconds_to_mmss;
use log::info;

pub fn get_segments(store: &Store, video_id: &str) -> PipelineResult<Vec<SegmentView>> {
    let rows = store.segments(video_id)?;
    if rows.is_empty() {
        if store.get_video(video_id)?.is_none() {
            info!("Segments requested for unknown video {video_id}");
        }
        return Err(PipelineError::not_found("No segments for this video"));
    }

    Ok(rows
        .into_iter()
        .map(|row| SegmentView {
            start: seconds_to_mmss(u32::try_from(row.start_sec).unwrap_or(0)),
            keyword: row.keyword,
            text: row.text,
            image: row.image_path,
        })
        .collect())
}
