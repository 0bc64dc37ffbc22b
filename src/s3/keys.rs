use uuid::Uuid;

/// Key for a payload staged ahead of processing (large uploads only).
pub fn staging_key(job_id: Uuid) -> String {
    format!("staging/{}", job_id)
}

/// Key for the accepted original image.
///
/// The timestamp is minted once at admission and carried in the envelope so
/// retried uploads always land on the same key.
pub fn original_key(job_id: Uuid, upload_ts: i64, content_type: &str) -> String {
    format!(
        "original/{}_{}.{}",
        job_id,
        upload_ts,
        extension_for(content_type)
    )
}

/// Key for the post-blur artifact.
pub fn processed_key(job_id: Uuid, upload_ts: i64, content_type: &str) -> String {
    format!(
        "processed/{}_{}.{}",
        job_id,
        upload_ts,
        extension_for(content_type)
    )
}

/// File extension derived from the MIME type; unknown types fall back to `bin`.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_prefix_discipline() {
        let job_id = Uuid::new_v4();

        assert_eq!(staging_key(job_id), format!("staging/{}", job_id));
        assert_eq!(
            original_key(job_id, 1700000000, "image/jpeg"),
            format!("original/{}_1700000000.jpg", job_id)
        );
        assert_eq!(
            processed_key(job_id, 1700000000, "image/png"),
            format!("processed/{}_1700000000.png", job_id)
        );
    }

    #[test]
    fn same_inputs_yield_same_key() {
        let job_id = Uuid::new_v4();

        assert_eq!(
            processed_key(job_id, 42, "image/jpeg"),
            processed_key(job_id, 42, "image/jpeg")
        );
    }

    #[test]
    fn unknown_content_type_defaults_to_bin() {
        assert_eq!(extension_for("application/octet-stream"), "bin");
        assert_eq!(extension_for(""), "bin");
    }
}
