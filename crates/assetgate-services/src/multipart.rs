//! Multipart request validation
//!
//! Checks run in a fixed order so callers always see the same error for the
//! same request: emptiness, part count, part numbers, sizes, alignment.

use std::collections::HashSet;

use assetgate_core::models::{PartETag, PartRequest};
use assetgate_core::{AppError, AppResult, MultipartLimits};

/// Validate the parts a client intends to upload against provider limits.
///
/// Sizes are optional; when declared, every part except the highest-numbered
/// one must lie within `[min_part_size, max_part_size]` and respect the
/// provider's alignment. The last part may be smaller.
pub fn validate_part_requests(limits: &MultipartLimits, parts: &[PartRequest]) -> AppResult<()> {
    check_numbers(limits, parts.iter().map(|p| p.part_number), parts.len())?;

    let last = parts.iter().map(|p| p.part_number).max().unwrap_or_default();
    for part in parts {
        let Some(size) = part.size else {
            continue;
        };

        let out_of_range = || AppError::PartSizeOutOfRange {
            part_number: part.part_number,
            size,
            min: limits.min_part_size,
            max: limits.max_part_size,
        };

        if size > limits.max_part_size || size == 0 {
            return Err(out_of_range());
        }
        if part.part_number == last {
            continue;
        }
        if size < limits.min_part_size {
            return Err(out_of_range());
        }
        if let Some(alignment) = limits.part_alignment.filter(|a| *a > 0) {
            if size % alignment != 0 {
                return Err(AppError::InvalidParameter {
                    parameter: format!("parts[{}].size", part.part_number),
                    reason: format!("must be a multiple of {} bytes", alignment),
                });
            }
        }
    }

    Ok(())
}

/// Validate the part receipts a client reports when confirming a multipart upload.
pub fn validate_part_etags(limits: &MultipartLimits, parts: &[PartETag]) -> AppResult<()> {
    check_numbers(limits, parts.iter().map(|p| p.part_number), parts.len())?;

    if let Some(part) = parts.iter().find(|p| p.etag.trim().is_empty()) {
        return Err(AppError::InvalidParameter {
            parameter: format!("parts[{}].etag", part.part_number),
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

fn check_numbers(
    limits: &MultipartLimits,
    numbers: impl Iterator<Item = u32>,
    count: usize,
) -> AppResult<()> {
    if count == 0 {
        return Err(AppError::InvalidParameter {
            parameter: "parts".to_string(),
            reason: "at least one part is required".to_string(),
        });
    }
    if count > limits.max_parts as usize {
        return Err(AppError::TooManyParts {
            requested: count,
            max: limits.max_parts,
        });
    }

    let mut seen = HashSet::with_capacity(count);
    for number in numbers {
        if number == 0 || number > limits.max_parts {
            return Err(AppError::InvalidParameter {
                parameter: "partNumber".to_string(),
                reason: format!(
                    "part number {} is outside [1, {}]",
                    number, limits.max_parts
                ),
            });
        }
        if !seen.insert(number) {
            return Err(AppError::InvalidParameter {
                parameter: "partNumber".to_string(),
                reason: format!("part number {} is repeated", number),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetgate_core::constants::{GIB, KIB, MIB};

    fn s3_limits() -> MultipartLimits {
        MultipartLimits::new(5 * MIB, 5 * GIB, 10_000)
    }

    #[test]
    fn too_many_parts() {
        let parts: Vec<_> = (1..=10_001).map(PartRequest::new).collect();
        let err = validate_part_requests(&s3_limits(), &parts).unwrap_err();
        assert!(matches!(
            err,
            AppError::TooManyParts {
                requested: 10_001,
                max: 10_000
            }
        ));
    }

    #[test]
    fn full_range_of_parts_is_accepted() {
        let parts: Vec<_> = (1..=10_000)
            .map(|n| PartRequest::new(n).with_size(5 * MIB))
            .collect();
        validate_part_requests(&s3_limits(), &parts).unwrap();
    }

    #[test]
    fn last_part_may_be_small() {
        let parts = vec![
            PartRequest::new(2).with_size(1024),
            PartRequest::new(1).with_size(5 * MIB),
        ];
        validate_part_requests(&s3_limits(), &parts).unwrap();

        let parts = vec![
            PartRequest::new(1).with_size(1024),
            PartRequest::new(2).with_size(5 * MIB),
        ];
        let err = validate_part_requests(&s3_limits(), &parts).unwrap_err();
        assert!(matches!(
            err,
            AppError::PartSizeOutOfRange { part_number: 1, .. }
        ));
    }

    #[test]
    fn oversized_parts_are_rejected() {
        let parts = vec![PartRequest::new(1).with_size(6 * GIB)];
        assert!(matches!(
            validate_part_requests(&s3_limits(), &parts),
            Err(AppError::PartSizeOutOfRange { .. })
        ));
    }

    #[test]
    fn empty_and_invalid_numbers_are_rejected() {
        assert!(validate_part_requests(&s3_limits(), &[]).is_err());
        assert!(validate_part_requests(&s3_limits(), &[PartRequest::new(0)]).is_err());
        assert!(validate_part_requests(&s3_limits(), &[PartRequest::new(10_001)]).is_err());
        assert!(
            validate_part_requests(&s3_limits(), &[PartRequest::new(3), PartRequest::new(3)])
                .is_err()
        );
    }

    #[test]
    fn alignment_applies_to_all_but_last() {
        let limits = MultipartLimits::new(256 * KIB, 5 * GIB, 10_000).with_part_alignment(256 * KIB);
        let ok = vec![
            PartRequest::new(1).with_size(512 * KIB),
            PartRequest::new(2).with_size(1000),
        ];
        validate_part_requests(&limits, &ok).unwrap();

        let misaligned = vec![
            PartRequest::new(1).with_size(300 * KIB),
            PartRequest::new(2).with_size(1000),
        ];
        assert!(matches!(
            validate_part_requests(&limits, &misaligned),
            Err(AppError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn etags_must_be_present() {
        let parts = vec![PartETag {
            part_number: 1,
            etag: " ".to_string(),
        }];
        assert!(validate_part_etags(&s3_limits(), &parts).is_err());
    }
}
