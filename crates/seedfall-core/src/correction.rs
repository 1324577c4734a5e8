//! Inhomogeneity correction by curve subtraction.
//!
//! Community-wide density variation shifts every species' K-curve the same
//! way, so the heterospecific curve built on the same window and radii is
//! subtracted from the conspecific one, radius by radius, for both the
//! empirical and the theoretical values.
use crate::error::{Result, SeedfallError};
use crate::kfunc::{KCurve, KValue};

/// `conspecific − heterospecific`.
///
/// Curves on different windows or radius sequences are not combinable and
/// fail. An undefined empirical value on either side stays undefined.
pub fn correct(conspecific: &KCurve, heterospecific: &KCurve) -> Result<KCurve> {
    if conspecific.support != heterospecific.support {
        return Err(SeedfallError::IncompatibleCurves {
            left: conspecific.support.to_string(),
            right: heterospecific.support.to_string(),
        });
    }
    if !conspecific.radii().eq(heterospecific.radii()) {
        return Err(SeedfallError::IncompatibleCurves {
            left: format!("{} over {} radii", conspecific.support, conspecific.values.len()),
            right: format!("{} over {} radii", heterospecific.support, heterospecific.values.len()),
        });
    }
    let values = conspecific
        .values
        .iter()
        .zip(&heterospecific.values)
        .map(|(c, h)| KValue {
            r: c.r,
            empirical: c.empirical.zip(h.empirical).map(|(a, b)| a - b),
            theoretical: c.theoretical - h.theoretical,
        })
        .collect();
    Ok(KCurve { support: conspecific.support.clone(), values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{WindowId, WindowKind};
    use crate::kfunc::{CurveSupport, Radii};

    fn support(kind: WindowKind) -> CurveSupport {
        let id = WindowId::new("s", kind);
        CurveSupport { reference: id.clone(), comparison: id }
    }

    fn curve(kind: WindowKind, empirical: &[Option<f64>]) -> KCurve {
        KCurve {
            support: support(kind),
            values: empirical
                .iter()
                .enumerate()
                .map(|(i, &e)| KValue { r: i as f64, empirical: e, theoretical: 3.0 * i as f64 })
                .collect(),
        }
    }

    #[test]
    fn self_subtraction_is_zero_everywhere() {
        let k = curve(WindowKind::Core, &[Some(0.0), Some(4.2), Some(13.0)]);
        let out = correct(&k, &k).unwrap();
        for v in &out.values {
            assert_eq!(v.empirical, Some(0.0));
            assert_eq!(v.theoretical, 0.0);
        }
    }

    #[test]
    fn subtracts_radius_by_radius() {
        let con = curve(WindowKind::Core, &[Some(0.0), Some(5.0), Some(20.0)]);
        let het = curve(WindowKind::Core, &[Some(0.0), Some(2.0), Some(12.5)]);
        let out = correct(&con, &het).unwrap();
        let emp: Vec<Option<f64>> = out.values.iter().map(|v| v.empirical).collect();
        assert_eq!(emp, vec![Some(0.0), Some(3.0), Some(7.5)]);
    }

    #[test]
    fn undefined_values_propagate() {
        let con = curve(WindowKind::Core, &[Some(0.0), None]);
        let het = curve(WindowKind::Core, &[Some(0.0), Some(1.0)]);
        let out = correct(&con, &het).unwrap();
        assert_eq!(out.values[1].empirical, None);
        assert!(!out.is_defined());
    }

    #[test]
    fn different_windows_are_rejected() {
        let con = curve(WindowKind::Core, &[Some(0.0)]);
        let het = curve(WindowKind::Full, &[Some(0.0)]);
        assert!(matches!(correct(&con, &het), Err(SeedfallError::IncompatibleCurves { .. })));
    }

    #[test]
    fn different_radii_are_rejected() {
        let con = KCurve::csr(support(WindowKind::Core), &Radii::up_to(3));
        let het = KCurve::csr(support(WindowKind::Core), &Radii::up_to(4));
        assert!(correct(&con, &het).is_err());
    }

    #[test]
    fn csr_background_centres_the_curve() {
        let con = KCurve::csr(support(WindowKind::Core), &Radii::up_to(2));
        let out = correct(&con, &KCurve::csr(support(WindowKind::Core), &Radii::up_to(2))).unwrap();
        assert!(out.values.iter().all(|v| v.empirical == Some(0.0) && v.theoretical == 0.0));
    }
}
