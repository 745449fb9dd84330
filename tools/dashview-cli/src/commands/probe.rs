//! List an event's clip groups.

use std::path::PathBuf;

use dashview_common::config::AppConfig;
use dashview_export_engine::SourceProvider;

use crate::event_dir::{display_name, ordered_cameras, scan_event};
use crate::folder_source::FolderSource;

pub async fn run(path: PathBuf, json: bool, config: &AppConfig) -> anyhow::Result<()> {
    let event = scan_event(&path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&event)?);
        return Ok(());
    }

    let cameras = ordered_cameras(&event);
    println!("Event: {}", event.name);
    if let Some(at) = event.started_at {
        println!("  Started: {at}");
    }
    let names: Vec<String> = cameras.iter().map(display_name).collect();
    println!("  Cameras: {}", names.join(", "));
    println!();

    let mut source = FolderSource::open(event, cameras.clone(), config.export.fps);
    let mut total = 0.0;
    println!("Clip groups:");
    for index in 0..source.clip_count() {
        let group = &source.event().groups[index];
        let created = group
            .created_at
            .map(|at| at.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let present = group.clips.len();
        let duration = match source.probe_duration(index).await {
            Ok(secs) => {
                total += secs;
                format!("{secs:.2}s")
            }
            Err(e) => {
                total += config.export.nominal_clip_secs;
                format!("unreadable ({e}), assuming {:.0}s", config.export.nominal_clip_secs)
            }
        };
        println!("  [{index:>3}] {created}  {present}/{} cameras  {duration}", cameras.len());
    }
    println!();
    println!("Total: {total:.2}s");
    Ok(())
}
