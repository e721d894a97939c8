// Turn a resolved resource into a Symphonia media source

use audiowave_core::{AudioError, CancelToken, ResolvedResource, Result};
use audiowave_transport_http::{HttpClient, HttpRangeSource};
use std::fs::File;
use symphonia::core::io::MediaSource;
use symphonia::core::probe::Hint;

/// Open a media source plus a format hint for `resource`.
///
/// Missing files and unreachable hosts are reported as `ResourceUnavailable`.
pub fn open_media_source(
    resource: &ResolvedResource,
    client: &HttpClient,
    cancel: &CancelToken,
) -> Result<(Box<dyn MediaSource>, Hint)> {
    let mut hint = Hint::new();
    if let Some(ext) = resource.extension() {
        hint.with_extension(&ext);
    }

    let source: Box<dyn MediaSource> = match resource {
        ResolvedResource::File(path) => {
            let file = File::open(path).map_err(|e| {
                AudioError::ResourceUnavailable(format!("open file {}: {}", path.display(), e))
            })?;
            Box::new(file)
        }
        ResolvedResource::Url(url) => {
            log::info!("Opening remote source {}", url);
            Box::new(HttpRangeSource::open(client.clone(), url, cancel.clone())?)
        }
    };

    Ok((source, hint))
}
