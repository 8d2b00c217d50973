use pressroom_core::config::{AuthConfig, AuthMode};
use pressroom_core::PressroomError;
use pressroom_protocol::{JobSummary, ServerFrame, ServerInfo, PROTOCOL_VERSION};
use pressroom_scheduler::Job;

/// Check the token carried by an observer's `connect` frame.
pub fn verify_auth(token: Option<&str>, auth: &AuthConfig) -> Result<(), PressroomError> {
    match auth.mode {
        AuthMode::None => Ok(()),
        AuthMode::Token => match (token, auth.token.as_deref()) {
            (Some(given), Some(expected)) if given == expected => Ok(()),
            (None, _) => Err(PressroomError::AuthFailed("token required".into())),
            _ => Err(PressroomError::AuthFailed("invalid token".into())),
        },
    }
}

pub fn server_info() -> ServerInfo {
    ServerInfo {
        name: "pressroom".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        protocol: PROTOCOL_VERSION,
    }
}

/// First frame after a successful `connect`: every job, sorted by id.
pub fn snapshot(mut jobs: Vec<Job>) -> ServerFrame {
    jobs.sort_by(|a, b| a.id.cmp(&b.id));
    ServerFrame::Snapshot {
        server: server_info(),
        jobs: jobs.into_iter().map(job_summary).collect(),
    }
}

fn job_summary(job: Job) -> JobSummary {
    JobSummary {
        status: job.status.to_string(),
        last_run_status: job.last_run_status.map(|s| s.to_string()),
        id: job.id,
        name: job.name,
        in_progress: job.in_progress,
        targets: job.target_ids,
        next_run_at: job.next_run_at,
        last_run_at: job.last_run_at,
    }
}
