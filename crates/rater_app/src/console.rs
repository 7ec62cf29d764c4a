use std::sync::mpsc::Receiver;

use rater_engine::EngineEvent;

/// Print events until every sender is dropped.
pub fn print_events(rx: Receiver<EngineEvent>) {
    for event in rx {
        println!("{}", event_line(&event));
    }
}

pub fn event_line(event: &EngineEvent) -> String {
    match event {
        EngineEvent::Stage(stage) => format!("==> {stage}"),
        EngineEvent::Progress(progress) => match progress.counts {
            Some(counts) => format!(
                "[{}] {} total={} completed={} failed={}",
                progress.query,
                progress.status,
                counts.total,
                counts.completed,
                counts.failed
            ),
            None => format!("[{}] {}", progress.query, progress.status),
        },
    }
}
