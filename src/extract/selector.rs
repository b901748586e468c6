//! Backend ranking and selection.

use super::backend::{
    Backend, CliBackend, CliTool, CustomCommandBackend, InProcessBackend, JobSpec, Probe,
};
use crate::config::ReaderOptions;
use crate::error::{ArchiveError, Result};

/// Backends in the order they are tried.
pub fn ranked_backends(options: &ReaderOptions) -> Vec<Box<dyn Backend>> {
    let mut backends: Vec<Box<dyn Backend>> = vec![Box::new(CustomCommandBackend::new(
        options.extractor.clone(),
    ))];
    if options.in_process {
        backends.push(Box::new(InProcessBackend));
    }
    for &tool in CliTool::chain() {
        backends.push(Box::new(CliBackend::new(tool)));
    }
    backends
}

/// First backend that is ready for `job`.
///
/// A fatal probe ends the search; nothing ranked below it is tried.
pub fn select(backends: Vec<Box<dyn Backend>>, job: &JobSpec) -> Result<Box<dyn Backend>> {
    for backend in backends {
        match backend.probe(job) {
            Probe::Ready => {
                log::debug!("Selected extraction backend: {}", backend.name());
                return Ok(backend);
            }
            Probe::Unavailable => log::debug!("Backend {} unavailable", backend.name()),
            Probe::Fatal(e) => return Err(e),
        }
    }
    Err(ArchiveError::NoBackend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractorConfig;
    use crate::zip::ArchiveManifest;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn job() -> JobSpec {
        JobSpec {
            archive: PathBuf::from("a.zip"),
            destination: PathBuf::from("out"),
            manifest: Arc::new(ArchiveManifest::default()),
            manifest_loaded: true,
        }
    }

    #[test]
    fn custom_extractor_ranks_first() {
        let options = ReaderOptions::default();
        let names: Vec<String> = ranked_backends(&options)
            .iter()
            .map(|b| b.name().to_string())
            .collect();
        assert_eq!(names[0], "custom");
        assert_eq!(names[1], "in-process");
        assert_eq!(names[2], "7z");
    }

    #[test]
    fn in_process_can_be_disabled() {
        let options = ReaderOptions {
            in_process: false,
            ..ReaderOptions::default()
        };
        assert!(ranked_backends(&options)
            .iter()
            .all(|b| b.name() != "in-process"));
    }

    #[test]
    fn unconfigured_custom_extractor_falls_through() {
        let backend = select(ranked_backends(&ReaderOptions::default()), &job()).unwrap();
        assert_eq!(backend.name(), "in-process");
    }

    #[test]
    fn missing_custom_extractor_stops_selection() {
        let options = ReaderOptions {
            extractor: ExtractorConfig::new("/no/such/extractor", "{zip} {dest}"),
            ..ReaderOptions::default()
        };
        let err = select(ranked_backends(&options), &job()).err().unwrap();
        assert!(matches!(err, ArchiveError::CustomExtractorMissing(_)));
    }
}
