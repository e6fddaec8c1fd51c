// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification of downloaded attachments into bot-side media kinds.

use courier_core::traits::account::RemoteMedia;
use courier_core::types::{MediaKind, MediaPayload};

/// Decide how a downloaded attachment should be re-sent.
///
/// A declared photo wins, then the MIME family, then the leading bytes.
pub fn classify(declared_photo: bool, mime_type: Option<&str>, data: &[u8]) -> MediaKind {
    if declared_photo {
        return MediaKind::Photo;
    }
    if let Some(mime) = mime_type.map(str::to_ascii_lowercase) {
        if mime.starts_with("video/") {
            return MediaKind::Video;
        }
        if mime.starts_with("image/") {
            return MediaKind::Photo;
        }
    }
    sniff(data)
}

fn sniff(data: &[u8]) -> MediaKind {
    match data {
        [0xFF, 0xD8, 0xFF, ..] => MediaKind::Photo,
        [0x89, b'P', b'N', b'G', ..] => MediaKind::Photo,
        [b'G', b'I', b'F', b'8', ..] => MediaKind::Photo,
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => MediaKind::Photo,
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => MediaKind::Video,
        // EBML header, shared by WebM and Matroska
        [0x1A, 0x45, 0xDF, 0xA3, ..] => MediaKind::Video,
        _ => MediaKind::Document,
    }
}

fn default_file_name(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Photo => "photo.jpg",
        MediaKind::Video => "video.mp4",
        MediaKind::Document => "file.bin",
    }
}

/// Build the payload for a downloaded attachment.
pub fn payload(remote: &RemoteMedia, data: Vec<u8>) -> MediaPayload {
    let kind = classify(remote.is_photo, remote.mime_type.as_deref(), &data);
    let file_name = remote
        .file_name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| default_file_name(kind).to_string());
    MediaPayload {
        kind,
        data,
        file_name,
        mime_type: remote.mime_type.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::traits::account::PlatformHandle;

    #[test]
    fn declared_photo_wins() {
        assert_eq!(classify(true, Some("video/mp4"), b""), MediaKind::Photo);
    }

    #[test]
    fn mime_family_decides_next() {
        assert_eq!(classify(false, Some("VIDEO/quicktime"), b""), MediaKind::Video);
        assert_eq!(classify(false, Some("image/webp"), b""), MediaKind::Photo);
        assert_eq!(classify(false, Some("application/pdf"), b"%PDF-1.7"), MediaKind::Document);
    }

    #[test]
    fn signatures_are_sniffed_without_mime() {
        assert_eq!(classify(false, None, &[0xFF, 0xD8, 0xFF, 0xE0]), MediaKind::Photo);
        assert_eq!(classify(false, None, b"\x89PNG\r\n\x1a\n"), MediaKind::Photo);
        assert_eq!(classify(false, None, b"GIF89a"), MediaKind::Photo);
        assert_eq!(classify(false, None, b"RIFF\0\0\0\0WEBPVP8 "), MediaKind::Photo);
        assert_eq!(classify(false, None, b"\0\0\0\x18ftypmp42"), MediaKind::Video);
        assert_eq!(classify(false, None, &[0x1A, 0x45, 0xDF, 0xA3, 0x01]), MediaKind::Video);
        assert_eq!(classify(false, None, b"PK\x03\x04"), MediaKind::Document);
        assert_eq!(classify(false, None, b""), MediaKind::Document);
    }

    #[test]
    fn payload_fills_in_a_file_name() {
        let remote = RemoteMedia {
            is_photo: false,
            mime_type: Some("video/mp4".into()),
            file_name: None,
            handle: PlatformHandle::new(()),
        };
        let media = payload(&remote, vec![1, 2, 3]);
        assert_eq!(media.kind, MediaKind::Video);
        assert_eq!(media.file_name, "video.mp4");

        let remote = RemoteMedia {
            file_name: Some("report.pdf".into()),
            ..remote
        };
        assert_eq!(payload(&remote, vec![]).file_name, "report.pdf");
    }
}
