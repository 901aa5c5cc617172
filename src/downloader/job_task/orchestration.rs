//! Job task orchestration: top-level lifecycle for a single job.

use std::path::{Path, PathBuf};

use crate::db::NewBook;
use crate::error::{Error, JobError, Result};
use crate::planner;
use crate::types::{Event, Status};
use crate::utils::{remove_dir_best_effort, sanitize_component, truncate_chars};

use super::context::JobTaskContext;
use super::progress::StageProgress;

/// Longest archive file stem, in characters
const MAX_ARCHIVE_STEM: usize = 100;

/// Core job task -- runs one job's pipeline to completion or failure.
///
/// Phases:
/// 1. Download the container (`downloading`)
/// 2. Plan chapters and convert them one by one (`converting`)
/// 3. Zip the chapter files and register the book (`zipping` → `completed`)
///
/// Every failure is classified, recorded on the job and emitted; none escapes
/// the task. Cancellation (a delete request or shutdown) is observed between
/// stages, between download chunks and between chapters, and is not recorded
/// as a failure. The job's working directory is always removed before the
/// worker slot is released.
pub(crate) async fn run_job_task(ctx: JobTaskContext) {
    let id = ctx.id;
    let job_dir = ctx.downloader.job_dir(id);

    match run_pipeline(&ctx, &job_dir).await {
        Ok(book) => {
            tracing::info!(
                job_id = id.0,
                book_id = %book.book_id,
                chapters = book.chapter_count,
                archive = %book.archive_path.display(),
                "Job completed"
            );
            ctx.downloader.emit_event(Event::Completed {
                id,
                user_id: ctx.user_id,
                book_id: book.book_id,
                archive_path: book.archive_path,
            });
        }
        Err(e) if e.is_cancellation() => {
            tracing::info!(job_id = id.0, "Job cancelled, discarding partial output");
        }
        Err(e) => ctx.mark_failed(&e).await,
    }

    remove_dir_best_effort(&job_dir).await;
    ctx.remove_from_active().await;
}

async fn run_pipeline(ctx: &JobTaskContext, job_dir: &Path) -> Result<NewBook> {
    let id = ctx.id;
    let pipeline = &ctx.downloader.pipeline;

    let job = ctx
        .db()
        .get_job(id)
        .await?
        .ok_or(Error::Job(JobError::NotFound { id }))?;
    let user_id = job.owner();
    ctx.checkpoint()?;

    // Download
    ctx.enter_stage(Status::Downloading).await?;
    let session = pipeline.sessions.session(user_id).await?;
    let fetched = pipeline
        .fetcher
        .fetch(
            &session,
            &job.book_id,
            job_dir,
            &ctx.cancel_token,
            &StageProgress::new(ctx, Status::Downloading),
        )
        .await?;
    ctx.checkpoint()?;

    // Plan + convert
    ctx.enter_stage(Status::Converting).await?;
    let license = &fetched.license;
    let title = if license.title.trim().is_empty() {
        job.title.clone()
    } else {
        license.title.clone()
    };

    let source = pipeline
        .converter
        .inspect(&fetched.container_path, license)
        .await;
    let plan = planner::plan(
        &license.chapters,
        source.duration,
        &title,
        pipeline.converter.extension(),
    );
    tracing::info!(
        job_id = id.0,
        chapters = plan.len(),
        whole_file = plan.whole_file,
        "Chapter plan ready"
    );

    let output_dir = job_dir.join("out");
    pipeline
        .converter
        .convert(
            &source,
            &plan,
            &output_dir,
            &ctx.cancel_token,
            &StageProgress::new(ctx, Status::Converting),
        )
        .await?;
    ctx.checkpoint()?;

    // Package + register
    ctx.enter_stage(Status::Zipping).await?;
    let book_dir = ctx.downloader.book_dir(user_id, &job.book_id);
    let archive_path = book_dir.join(format!("{}.zip", archive_stem(&title, &job.book_id)));
    // Only a registered book owns an archive; anything else is left over from a crash
    if ctx.db().get_book(user_id, &job.book_id).await?.is_none()
        && tokio::fs::try_exists(&archive_path).await.unwrap_or(false)
    {
        tracing::warn!(job_id = id.0, archive = %archive_path.display(), "Removing orphaned archive");
        discard_archive(&archive_path).await;
    }
    let packaged = pipeline.packager.package(&output_dir, &archive_path).await?;

    let book = NewBook {
        user_id,
        book_id: job.book_id.clone(),
        title,
        author: license.author_line(),
        archive_path: packaged.path.clone(),
        chapter_count: u32::try_from(packaged.entries.len()).unwrap_or(u32::MAX),
    };

    // A job deleted while zipping must not leave a book behind
    let registered = match ctx.checkpoint() {
        Ok(()) => ctx.db().complete_job_with_book(id, &book).await,
        Err(e) => Err(e),
    };
    if let Err(e) = registered {
        discard_archive(&packaged.path).await;
        return Err(e);
    }

    if ctx.downloader.config.jobs.keep_container {
        keep_container(&fetched.container_path, &packaged.path).await;
    }

    Ok(book)
}

/// File stem for the archive: the sanitized title, else the book id
fn archive_stem(title: &str, book_id: &str) -> String {
    sanitize_component(title)
        .or_else(|| sanitize_component(book_id))
        .map(|stem| truncate_chars(&stem, MAX_ARCHIVE_STEM))
        .unwrap_or_else(|| "book".to_string())
}

async fn discard_archive(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove archive"),
    }
}

/// Move the container next to the archive before the job directory goes away
async fn keep_container(container: &Path, archive: &Path) {
    let target: PathBuf = match container.extension() {
        Some(ext) => archive.with_extension(ext),
        None => archive.with_extension("container"),
    };
    if let Err(e) = tokio::fs::rename(container, &target).await {
        tracing::warn!(
            from = %container.display(),
            to = %target.display(),
            error = %e,
            "Failed to keep container"
        );
    }
}
