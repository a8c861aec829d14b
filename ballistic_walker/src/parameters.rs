use mass_properties::{MassProperties, MassPropertiesErrors, Segment};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParameterError {
    #[error("{name} must be finite and positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("{link} {quantity} must be finite and positive, got {value}")]
    LinkNotPositive {
        link: &'static str,
        quantity: &'static str,
        value: f64,
    },
    #[error("gravity must be finite and non-negative, got {0}")]
    InvalidGravity(f64),
    #[error("{link}: center of mass {lc} is not inside the link (0, {length})")]
    CenterOfMassOutsideLink {
        link: &'static str,
        lc: f64,
        length: f64,
    },
    #[error("{link}: {source}")]
    MassProperties {
        link: &'static str,
        #[source]
        source: MassPropertiesErrors,
    },
}

/// Fractions describing one body segment relative to the whole body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentRatios {
    /// Fraction of body mass.
    pub mass: f64,
    /// Fraction of body height.
    pub length: f64,
    /// Distance of the centre of mass from the proximal joint, as a fraction of segment length.
    pub com: f64,
    /// Radius of gyration about the centre of mass, as a fraction of segment length.
    pub gyration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FootRatios {
    pub mass: f64,
    pub length: f64,
    pub gyration: f64,
}

/// Segment table for the leg. Defaults are Winter's anthropometric data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnthropometricRatios {
    pub thigh: SegmentRatios,
    pub shank: SegmentRatios,
    pub foot: FootRatios,
}

impl Default for AnthropometricRatios {
    fn default() -> Self {
        Self {
            thigh: SegmentRatios {
                mass: 0.100,
                length: 0.245,
                com: 0.433,
                gyration: 0.323,
            },
            shank: SegmentRatios {
                mass: 0.0465,
                length: 0.246,
                com: 0.433,
                gyration: 0.302,
            },
            foot: FootRatios {
                mass: 0.0145,
                length: 0.152,
                gyration: 0.475,
            },
        }
    }
}

/// Whole-body description the link parameters are derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    /// kg
    pub body_mass: f64,
    /// m
    pub body_height: f64,
    /// m/s^2
    pub gravity: f64,
    pub ratios: AnthropometricRatios,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            body_mass: 65.0,
            body_height: 1.70,
            gravity: 9.81,
            ratios: AnthropometricRatios::default(),
        }
    }
}

impl WalkerConfig {
    pub fn with_body_mass(mut self, body_mass: f64) -> Self {
        self.body_mass = body_mass;
        self
    }

    pub fn with_body_height(mut self, body_height: f64) -> Self {
        self.body_height = body_height;
        self
    }

    pub fn with_gravity(mut self, gravity: f64) -> Self {
        self.gravity = gravity;
        self
    }
}

/// Rigid link of the walker. `lc` is measured from the hip for the stance leg
/// and the swing thigh, and from the knee for the swing shank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkParameters {
    pub mass: f64,
    /// Centroidal moment of inertia, kg m^2.
    pub inertia: f64,
    pub length: f64,
    pub lc: f64,
}

impl LinkParameters {
    fn from_segment(segment: &Segment) -> Self {
        Self {
            mass: segment.mass(),
            inertia: segment.inertia(),
            length: segment.length,
            lc: segment.center_of_mass(),
        }
    }
}

/// Validated, immutable parameter set of the three-link walker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalkerParameters {
    /// Link 1, thigh and shank lumped from hip to ankle.
    pub stance: LinkParameters,
    /// Link 2.
    pub thigh: LinkParameters,
    /// Link 3, shank with the foot lumped at the ankle.
    pub shank: LinkParameters,
    pub gravity: f64,
    /// Only used for drawing the swing foot.
    pub foot_length: f64,
}

impl WalkerParameters {
    /// Builds a parameter set from explicit link values, validating it.
    pub fn new(
        stance: LinkParameters,
        thigh: LinkParameters,
        shank: LinkParameters,
        gravity: f64,
        foot_length: f64,
    ) -> Result<Self, ParameterError> {
        let params = Self {
            stance,
            thigh,
            shank,
            gravity,
            foot_length,
        };
        params.validate()?;
        Ok(params)
    }

    /// Derives the three links from body mass, height and segment ratios.
    pub fn from_config(config: &WalkerConfig) -> Result<Self, ParameterError> {
        positive("body mass", config.body_mass)?;
        positive("body height", config.body_height)?;
        let ratios = &config.ratios;
        for (name, value) in [
            ("thigh mass ratio", ratios.thigh.mass),
            ("thigh length ratio", ratios.thigh.length),
            ("thigh com ratio", ratios.thigh.com),
            ("thigh gyration ratio", ratios.thigh.gyration),
            ("shank mass ratio", ratios.shank.mass),
            ("shank length ratio", ratios.shank.length),
            ("shank com ratio", ratios.shank.com),
            ("shank gyration ratio", ratios.shank.gyration),
            ("foot mass ratio", ratios.foot.mass),
            ("foot length ratio", ratios.foot.length),
            ("foot gyration ratio", ratios.foot.gyration),
        ] {
            positive(name, value)?;
        }

        let segment = |link: &'static str, r: &SegmentRatios| {
            Segment::from_ratios(
                r.mass * config.body_mass,
                r.length * config.body_height,
                r.com,
                r.gyration,
            )
            .map_err(|source| ParameterError::MassProperties { link, source })
        };
        let thigh = segment("thigh", &ratios.thigh)?;
        let shank = segment("shank", &ratios.shank)?;

        let foot_length = ratios.foot.length * config.body_height;
        let foot = MassProperties::from_gyration(
            ratios.foot.mass * config.body_mass,
            shank.length,
            ratios.foot.gyration * foot_length,
        )
        .map_err(|source| ParameterError::MassProperties {
            link: "foot",
            source,
        })?;

        let stance = compose(
            "stance leg",
            thigh.length + shank.length,
            &[
                thigh.mass_properties,
                shank.mass_properties.translated(thigh.length),
            ],
        )?;
        let swing_shank = compose("swing shank", shank.length, &[shank.mass_properties, foot])?;

        Self::new(
            LinkParameters::from_segment(&stance),
            LinkParameters::from_segment(&thigh),
            LinkParameters::from_segment(&swing_shank),
            config.gravity,
            foot_length,
        )
    }

    pub fn validate(&self) -> Result<(), ParameterError> {
        if !self.gravity.is_finite() || self.gravity < 0.0 {
            return Err(ParameterError::InvalidGravity(self.gravity));
        }
        positive("foot length", self.foot_length)?;
        for (name, link) in self.links() {
            for (quantity, value) in [("mass", link.mass), ("length", link.length)] {
                if !(value.is_finite() && value > 0.0) {
                    return Err(ParameterError::LinkNotPositive {
                        link: name,
                        quantity,
                        value,
                    });
                }
            }
            if !link.inertia.is_finite() || link.inertia < 0.0 {
                return Err(ParameterError::MassProperties {
                    link: name,
                    source: MassPropertiesErrors::InertiaLessThanZero,
                });
            }
            if !(link.lc > 0.0 && link.lc < link.length) {
                return Err(ParameterError::CenterOfMassOutsideLink {
                    link: name,
                    lc: link.lc,
                    length: link.length,
                });
            }
        }
        Ok(())
    }

    /// Links in generalized-coordinate order.
    pub fn links(&self) -> [(&'static str, &LinkParameters); 3] {
        [
            ("stance leg", &self.stance),
            ("swing thigh", &self.thigh),
            ("swing shank", &self.shank),
        ]
    }

    pub fn total_mass(&self) -> f64 {
        self.stance.mass + self.thigh.mass + self.shank.mass
    }

    /// Constant coefficients of the equations of motion.
    pub fn coefficients(&self) -> InertialCoefficients {
        InertialCoefficients::new(self)
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ParameterError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ParameterError::NotPositive { name, value })
    }
}

fn compose(
    link: &'static str,
    length: f64,
    parts: &[MassProperties],
) -> Result<Segment, ParameterError> {
    MassProperties::combine(parts)
        .and_then(|mp| Segment::new(length, mp))
        .map_err(|source| ParameterError::MassProperties { link, source })
}

/// Configuration-independent products of the link parameters that appear in
/// the mass matrix, the generalized forces and the energy.
///
/// With `d1 = l1 - lc1` the distance from the stance foot to the stance-leg
/// centre of mass:
///
/// ```text
/// m11 = I1 + M1 d1^2 + (M2 + M3) l1^2     a12 = (M2 lc2 + M3 l2) l1
/// m22 = I2 + M2 lc2^2 + M3 l2^2           a13 = M3 lc3 l1
/// m33 = I3 + M3 lc3^2                     a23 = M3 l2 lc3
/// b1 = M1 d1 + (M2 + M3) l1   b2 = M2 lc2 + M3 l2   b3 = M3 lc3
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InertialCoefficients {
    pub m11: f64,
    pub m22: f64,
    pub m33: f64,
    pub a12: f64,
    pub a13: f64,
    pub a23: f64,
    pub b1: f64,
    pub b2: f64,
    pub b3: f64,
    pub gravity: f64,
}

impl InertialCoefficients {
    pub fn new(params: &WalkerParameters) -> Self {
        let LinkParameters {
            mass: m1,
            inertia: i1,
            length: l1,
            lc: lc1,
        } = params.stance;
        let LinkParameters {
            mass: m2,
            inertia: i2,
            length: l2,
            lc: lc2,
        } = params.thigh;
        let LinkParameters {
            mass: m3,
            inertia: i3,
            lc: lc3,
            ..
        } = params.shank;

        let d1 = l1 - lc1;
        Self {
            m11: i1 + m1 * d1 * d1 + (m2 + m3) * l1 * l1,
            m22: i2 + m2 * lc2 * lc2 + m3 * l2 * l2,
            m33: i3 + m3 * lc3 * lc3,
            a12: (m2 * lc2 + m3 * l2) * l1,
            a13: m3 * lc3 * l1,
            a23: m3 * l2 * lc3,
            b1: m1 * d1 + (m2 + m3) * l1,
            b2: m2 * lc2 + m3 * l2,
            b3: m3 * lc3,
            gravity: params.gravity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn default_params() -> WalkerParameters {
        WalkerParameters::from_config(&WalkerConfig::default()).unwrap()
    }

    #[test]
    fn default_links() {
        let p = default_params();
        let h = 1.70;
        assert_abs_diff_eq!(p.thigh.mass, 6.5, epsilon = 1e-12);
        assert_abs_diff_eq!(p.thigh.length, 0.245 * h, epsilon = 1e-12);
        assert_abs_diff_eq!(p.thigh.lc, 0.433 * 0.245 * h, epsilon = 1e-12);
        assert_abs_diff_eq!(p.stance.mass, 6.5 + 0.0465 * 65.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.stance.length, (0.245 + 0.246) * h, epsilon = 1e-12);
        assert_abs_diff_eq!(p.shank.mass, (0.0465 + 0.0145) * 65.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.shank.length, 0.246 * h, epsilon = 1e-12);
        assert_abs_diff_eq!(p.foot_length, 0.152 * h, epsilon = 1e-12);
        assert_abs_diff_eq!(p.gravity, 9.81);
        assert_abs_diff_eq!(p.total_mass(), 0.2075 * 65.0 + 6.5, epsilon = 1e-12);
    }

    #[test]
    fn composite_links_follow_parallel_axis() {
        let p = default_params();
        let h: f64 = 1.70;
        let (lt, ls) = (0.245 * h, 0.246 * h);
        let (mt, ms) = (6.5, 0.0465 * 65.0);
        let (ct, cs) = (0.433 * lt, 0.433 * ls);
        let it = mt * (0.323 * lt).powi(2);
        let is = ms * (0.302 * ls).powi(2);

        let lc1 = (mt * ct + ms * (lt + cs)) / (mt + ms);
        assert_abs_diff_eq!(p.stance.lc, lc1, epsilon = 1e-12);
        let i_hip = it + mt * ct * ct + is + ms * (lt + cs).powi(2);
        assert_abs_diff_eq!(p.stance.inertia, i_hip - (mt + ms) * lc1 * lc1, epsilon = 1e-12);

        // foot lumped at the ankle moves the shank centre of mass distally
        assert!(p.shank.lc > cs);
        assert!(p.shank.lc < ls);
        assert!(p.shank.inertia > 0.0);
    }

    #[test]
    fn coefficients_from_links() {
        let p = default_params();
        let c = p.coefficients();
        let d1 = p.stance.length - p.stance.lc;
        assert_abs_diff_eq!(
            c.b1,
            p.stance.mass * d1 + (p.thigh.mass + p.shank.mass) * p.stance.length,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(c.a23, p.shank.mass * p.thigh.length * p.shank.lc, epsilon = 1e-12);
        assert_abs_diff_eq!(c.gravity, 9.81);
    }

    #[test]
    fn rejects_bad_body_mass() {
        for mass in [0.0, -65.0, f64::NAN, f64::INFINITY] {
            let err =
                WalkerParameters::from_config(&WalkerConfig::default().with_body_mass(mass))
                    .unwrap_err();
            assert!(matches!(err, ParameterError::NotPositive { name: "body mass", .. }));
        }
    }

    #[test]
    fn rejects_bad_gravity() {
        let err = WalkerParameters::from_config(&WalkerConfig::default().with_gravity(-9.81))
            .unwrap_err();
        assert_eq!(err, ParameterError::InvalidGravity(-9.81));
        // zero gravity is a valid, if unusual, model
        assert!(WalkerParameters::from_config(&WalkerConfig::default().with_gravity(0.0)).is_ok());
    }

    #[test]
    fn rejects_com_outside_segment() {
        let mut config = WalkerConfig::default();
        config.ratios.thigh.com = 1.2;
        let err = WalkerParameters::from_config(&config).unwrap_err();
        assert!(matches!(
            err,
            ParameterError::MassProperties {
                link: "thigh",
                source: MassPropertiesErrors::CenterOfMassOutsideSegment { .. }
            }
        ));
    }

    #[test]
    fn rejects_explicit_link_with_bad_lc() {
        let p = default_params();
        let mut shank = p.shank;
        shank.lc = shank.length;
        let err = WalkerParameters::new(p.stance, p.thigh, shank, p.gravity, p.foot_length)
            .unwrap_err();
        assert!(matches!(
            err,
            ParameterError::CenterOfMassOutsideLink { link: "swing shank", .. }
        ));
    }

    #[test]
    fn names_the_failing_link_quantity() {
        let p = default_params();
        let mut thigh = p.thigh;
        thigh.length = 0.0;
        let err = WalkerParameters::new(p.stance, thigh, p.shank, p.gravity, p.foot_length)
            .unwrap_err();
        assert_eq!(
            err,
            ParameterError::LinkNotPositive {
                link: "swing thigh",
                quantity: "length",
                value: 0.0,
            }
        );
        assert!(err.to_string().starts_with("swing thigh length"));

        let mut stance = p.stance;
        stance.mass = f64::NAN;
        let err = WalkerParameters::new(stance, p.thigh, p.shank, p.gravity, p.foot_length)
            .unwrap_err();
        assert!(err.to_string().starts_with("stance leg mass"));
    }

    #[test]
    fn config_ron_defaults() {
        let config: WalkerConfig = ron::from_str("(body_mass: 80.0)").unwrap();
        assert_eq!(config.body_mass, 80.0);
        assert_eq!(config.body_height, 1.70);
        assert_eq!(config.ratios, AnthropometricRatios::default());
    }
}
