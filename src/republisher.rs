use std::{io, path::Path as FsPath, sync::Arc};

use bytes::{Bytes, BytesMut};
use object_store::{
    path::Path, Attribute, AttributeValue, Attributes, MultipartUpload, PutMultipartOpts,
    PutPayload,
};
use thiserror::Error;
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt},
};
use tracing::{debug, info, instrument, warn};

use crate::{event::StorageEvent, object_stores::BucketStores};

/// GCS and S3 multipart uploads want every part but the last to be at least 5 MiB.
const PART_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no staged image at {0}")]
    MissingStaged(String),
    #[error("object name {name:?} can't be written back verbatim: {source}")]
    InvalidName {
        name: String,
        #[source]
        source: object_store::path::Error,
    },
    #[error("failed to open object store: {0:#}")]
    Store(anyhow::Error),
    #[error("failed to write optimized image: {0}")]
    Io(String),
    #[error("failed to commit optimized image: {0}")]
    Commit(#[source] object_store::Error),
}

/// The location of the event's object, byte for byte. `Path::from` would percent-encode some
/// characters and collapse empty segments, which writes a different object than the one we read.
pub fn object_location(event: &StorageEvent) -> Result<Path, PublishError> {
    Path::parse(&event.name).map_err(|source| PublishError::InvalidName {
        name: event.name.clone(),
        source,
    })
}

/// Headers and metadata the replaced object should carry.
pub fn replace_attributes(event: &StorageEvent) -> Attributes {
    let mut attributes = Attributes::new();

    let headers = [
        (Attribute::CacheControl, &event.cache_control),
        (Attribute::ContentDisposition, &event.content_disposition),
        (Attribute::ContentEncoding, &event.content_encoding),
        (Attribute::ContentLanguage, &event.content_language),
        (Attribute::ContentType, &event.content_type),
    ];
    for (attribute, value) in headers {
        if !value.is_empty() {
            attributes.insert(attribute, AttributeValue::from(value.clone()));
        }
    }

    for (key, value) in event.compressed_metadata() {
        attributes.insert(Attribute::Metadata(key.into()), AttributeValue::from(value));
    }

    attributes
}

/// Fills a buffer up to `size` bytes, short only at the end of the reader.
async fn read_part<R: AsyncRead + Unpin>(reader: &mut R, size: usize) -> io::Result<Bytes> {
    let mut buf = BytesMut::with_capacity(size);
    while buf.len() < size {
        if reader.read_buf(&mut buf).await? == 0 {
            break;
        }
    }
    Ok(buf.freeze())
}

async fn upload_parts(
    file: &mut File,
    upload: &mut Box<dyn MultipartUpload>,
) -> Result<usize, PublishError> {
    let mut size = 0;
    let mut parts = 0;

    loop {
        let part = read_part(file, PART_SIZE)
            .await
            .map_err(|e| PublishError::Io(e.to_string()))?;

        // An empty image still needs one part for the upload to complete.
        if part.is_empty() && parts > 0 {
            break;
        }

        let is_last = part.len() < PART_SIZE;
        size += part.len();
        parts += 1;

        upload
            .put_part(PutPayload::from(part))
            .await
            .map_err(|e| PublishError::Io(e.to_string()))?;

        if is_last {
            break;
        }
    }

    Ok(size)
}

pub struct Republisher<S: BucketStores + ?Sized> {
    stores: Arc<S>,
}

impl<S: BucketStores + ?Sized> Republisher<S> {
    pub fn new(stores: Arc<S>) -> Self {
        Self { stores }
    }

    /// Overwrites the event's object with the staged bytes. The write produces a new event for
    /// the same object, that one carries the compressed marker and is skipped.
    #[instrument(skip_all, fields(bucket = %event.bucket, name = %event.name))]
    pub async fn republish(
        &self,
        event: &StorageEvent,
        staged: &FsPath,
    ) -> Result<(), PublishError> {
        let location = object_location(event)?;

        let mut file = match File::open(staged).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PublishError::MissingStaged(staged.display().to_string()))
            }
            Err(e) => return Err(PublishError::Io(e.to_string())),
        };

        let store = self
            .stores
            .store_for(&event.bucket)
            .map_err(PublishError::Store)?;

        let opts = PutMultipartOpts {
            attributes: replace_attributes(event),
            ..Default::default()
        };
        let mut upload = store
            .put_multipart_opts(&location, opts)
            .await
            .map_err(|e| PublishError::Io(e.to_string()))?;

        let size = match upload_parts(&mut file, &mut upload).await {
            Ok(size) => size,
            Err(e) => {
                if let Err(abort_err) = upload.abort().await {
                    warn!(%abort_err, "failed to abort upload");
                }
                return Err(e);
            }
        };

        upload.complete().await.map_err(PublishError::Commit)?;

        debug!(size, "uploaded optimized image");
        info!("success, optimized and replaced image");

        Ok(())
    }
}
