//! Grid consistency checks against the run's reference.

use merge_common::{Grid, GridSpec};

use crate::error::{MismatchError, MismatchField};

/// Pass `candidate` through if it can be stacked on `reference`.
///
/// With no reference the candidate passes and becomes the reference.
/// Dimensions, geotransform (bit for bit) and CRS must match exactly;
/// parameter and valid time are not compared.
pub fn validate(candidate: Grid, reference: Option<&GridSpec>) -> Result<Grid, MismatchError> {
    let Some(reference) = reference else {
        return Ok(candidate);
    };
    let spec = &candidate.spec;
    let mismatch = |field, reference: String, found: String| MismatchError {
        field,
        reference,
        candidate: found,
        key: candidate.source_key.clone(),
    };

    if spec.width != reference.width || spec.height != reference.height {
        return Err(mismatch(
            MismatchField::Dimensions,
            format!("{}x{}", reference.width, reference.height),
            format!("{}x{}", spec.width, spec.height),
        ));
    }

    if !spec.geotransform.bit_eq(&reference.geotransform) {
        return Err(mismatch(
            MismatchField::GeoTransform,
            reference.geotransform.to_string(),
            spec.geotransform.to_string(),
        ));
    }

    if spec.crs != reference.crs {
        return Err(mismatch(
            MismatchField::Crs,
            reference.crs.to_string(),
            spec.crs.to_string(),
        ));
    }

    Ok(candidate)
}
