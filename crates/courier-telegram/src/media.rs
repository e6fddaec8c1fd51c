// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Upload size policy for outbound media.
//!
//! The bot protocol rejects photos above 10 MiB and videos above 50 MiB when
//! sent as their native kind, but accepts the same bytes as a document.

use std::borrow::Cow;

use courier_core::types::{MediaKind, MediaPayload};

/// Largest photo accepted as a photo.
pub const MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;

/// Largest video accepted as a video.
pub const MAX_VIDEO_BYTES: usize = 50 * 1024 * 1024;

/// The kind a payload of `len` bytes must be sent as.
pub fn effective_kind(kind: MediaKind, len: usize) -> MediaKind {
    match kind {
        MediaKind::Photo if len > MAX_PHOTO_BYTES => MediaKind::Document,
        MediaKind::Video if len > MAX_VIDEO_BYTES => MediaKind::Document,
        other => other,
    }
}

/// Apply the size policy, cloning only when the kind changes.
pub fn fit_for_upload(media: &MediaPayload) -> Cow<'_, MediaPayload> {
    let kind = effective_kind(media.kind, media.data.len());
    if kind == media.kind {
        Cow::Borrowed(media)
    } else {
        tracing::debug!(
            from = %media.kind,
            to = %kind,
            bytes = media.data.len(),
            "media too large for its kind, sending as document"
        );
        let mut downgraded = media.clone();
        downgraded.kind = kind;
        Cow::Owned(downgraded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(effective_kind(MediaKind::Photo, MAX_PHOTO_BYTES), MediaKind::Photo);
        assert_eq!(
            effective_kind(MediaKind::Photo, MAX_PHOTO_BYTES + 1),
            MediaKind::Document
        );
        assert_eq!(effective_kind(MediaKind::Video, MAX_VIDEO_BYTES), MediaKind::Video);
        assert_eq!(
            effective_kind(MediaKind::Video, MAX_VIDEO_BYTES + 1),
            MediaKind::Document
        );
        assert_eq!(
            effective_kind(MediaKind::Document, usize::MAX),
            MediaKind::Document
        );
    }

    #[test]
    fn small_media_is_borrowed() {
        let media = MediaPayload {
            kind: MediaKind::Photo,
            data: vec![0; 16],
            file_name: "a.jpg".into(),
            mime_type: Some("image/jpeg".into()),
        };
        assert!(matches!(fit_for_upload(&media), Cow::Borrowed(_)));
    }
}
