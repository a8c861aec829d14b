use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MassPropertiesErrors {
    #[error("center of mass {com} is not inside the segment (0, {length})")]
    CenterOfMassOutsideSegment { com: f64, length: f64 },
    #[error("composite inertia {0} is negative after the parallel-axis transfer")]
    CompositeInertiaNegative(f64),
    #[error("cannot combine an empty set of mass properties")]
    EmptyComposition,
    #[error("inertia cant be less than zero")]
    InertiaLessThanZero,
    #[error("length cannot be less than or equal to zero")]
    LengthLessThanOrEqualToZero,
    #[error("mass cannot be less than or equal to zero")]
    MassLessThanOrEqualToZero,
    #[error("{0} must be finite")]
    NonFinite(&'static str),
}

/// Planar mass properties of a rigid body whose centre of mass lies on a line.
///
/// `center_of_mass` is a signed distance along that line from whatever reference
/// point the owner picks (for a segment, its proximal joint). `inertia` is the
/// moment of inertia about the centre of mass, perpendicular to the plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f64,
    pub center_of_mass: f64,
    pub inertia: f64,
}

impl MassProperties {
    pub fn new(mass: f64, center_of_mass: f64, inertia: f64) -> Result<Self, MassPropertiesErrors> {
        if !mass.is_finite() {
            return Err(MassPropertiesErrors::NonFinite("mass"));
        }
        if !center_of_mass.is_finite() {
            return Err(MassPropertiesErrors::NonFinite("center of mass"));
        }
        if !inertia.is_finite() {
            return Err(MassPropertiesErrors::NonFinite("inertia"));
        }
        if mass <= f64::EPSILON {
            return Err(MassPropertiesErrors::MassLessThanOrEqualToZero);
        }
        if inertia < 0.0 {
            return Err(MassPropertiesErrors::InertiaLessThanZero);
        }
        Ok(Self {
            mass,
            center_of_mass,
            inertia,
        })
    }

    /// Builds the properties from a radius of gyration about the centre of mass.
    pub fn from_gyration(
        mass: f64,
        center_of_mass: f64,
        radius_of_gyration: f64,
    ) -> Result<Self, MassPropertiesErrors> {
        Self::new(mass, center_of_mass, mass * radius_of_gyration * radius_of_gyration)
    }

    /// A point mass at `location`.
    pub fn point(mass: f64, location: f64) -> Result<Self, MassPropertiesErrors> {
        Self::new(mass, location, 0.0)
    }

    /// Moment of inertia about `point` (parallel-axis theorem).
    pub fn inertia_about(&self, point: f64) -> f64 {
        let d = self.center_of_mass - point;
        self.inertia + self.mass * d * d
    }

    /// Same body, with the centre of mass measured from a reference shifted by `offset`.
    pub fn translated(&self, offset: f64) -> Self {
        Self {
            center_of_mass: self.center_of_mass + offset,
            ..*self
        }
    }

    /// Lumps several bodies that share a reference point into one rigid body.
    ///
    /// Inertias are summed about the shared reference and then transferred to the
    /// composite centre of mass, `I_c = I_ref - M * c^2`.
    pub fn combine(parts: &[MassProperties]) -> Result<Self, MassPropertiesErrors> {
        if parts.is_empty() {
            return Err(MassPropertiesErrors::EmptyComposition);
        }

        let mass: f64 = parts.iter().map(|p| p.mass).sum();
        let first_moment: f64 = parts.iter().map(|p| p.mass * p.center_of_mass).sum();
        let inertia_ref: f64 = parts.iter().map(|p| p.inertia_about(0.0)).sum();

        let center_of_mass = first_moment / mass;
        let mut inertia = inertia_ref - mass * center_of_mass * center_of_mass;

        // cancellation in the transfer can leave a few ulps of negative inertia
        if inertia < 0.0 {
            if inertia.abs() <= 1e-12 * inertia_ref.max(f64::EPSILON) {
                inertia = 0.0;
            } else {
                return Err(MassPropertiesErrors::CompositeInertiaNegative(inertia));
            }
        }

        Self::new(mass, center_of_mass, inertia)
    }
}

/// A straight rigid segment of known length, centre of mass measured from the
/// proximal end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub length: f64,
    pub mass_properties: MassProperties,
}

impl Segment {
    pub fn new(length: f64, mass_properties: MassProperties) -> Result<Self, MassPropertiesErrors> {
        if !length.is_finite() {
            return Err(MassPropertiesErrors::NonFinite("length"));
        }
        if length <= f64::EPSILON {
            return Err(MassPropertiesErrors::LengthLessThanOrEqualToZero);
        }
        let com = mass_properties.center_of_mass;
        if com <= 0.0 || com >= length {
            return Err(MassPropertiesErrors::CenterOfMassOutsideSegment { com, length });
        }
        Ok(Self {
            length,
            mass_properties,
        })
    }

    /// Segment from anthropometric fractions: centre of mass and radius of
    /// gyration are both given as fractions of `length`.
    pub fn from_ratios(
        mass: f64,
        length: f64,
        com_ratio: f64,
        gyration_ratio: f64,
    ) -> Result<Self, MassPropertiesErrors> {
        let mp = MassProperties::from_gyration(mass, com_ratio * length, gyration_ratio * length)?;
        Self::new(length, mp)
    }

    pub fn mass(&self) -> f64 {
        self.mass_properties.mass
    }

    pub fn center_of_mass(&self) -> f64 {
        self.mass_properties.center_of_mass
    }

    pub fn inertia(&self) -> f64 {
        self.mass_properties.inertia
    }
}
