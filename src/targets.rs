//! Calibration target layouts, and the order they are presented in.
//!
//! The first point of every layout is the screen centre. A calibration pass
//! starts and ends on it, with the remaining points shuffled in between, so
//! the participant always begins and finishes looking straight ahead.

use crate::error::{invalid, Result, TrackerError};
use crate::Point;

use nom::{
    character::complete::{char, multispace0, multispace1, space0},
    combinator::all_consuming,
    multi::separated_list1,
    number::complete::double,
    sequence::{delimited, separated_pair},
    Finish, IResult,
};
use rand::prelude::*;
use std::str::FromStr;

/// An ordered set of calibration targets, in degrees of visual angle.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTargets(Vec<Point>);

impl CalibrationTargets {
    /// Centre plus four points on the cardinal axes.
    pub fn five_point() -> Self {
        CalibrationTargets(
            [(0.0, 0.0), (-3.0, 0.0), (0.0, 3.0), (3.0, 0.0), (0.0, -3.0)]
                .into_iter()
                .map(Point::from)
                .collect(),
        )
    }

    /// The five point layout plus four diagonal corners.
    pub fn nine_point() -> Self {
        let mut targets = Self::five_point();
        targets.0.extend(
            [(6.0, 6.0), (6.0, -6.0), (-6.0, 6.0), (-6.0, -6.0)]
                .into_iter()
                .map(Point::from),
        );
        targets
    }

    /// The built-in layout for a calibration point count of 5 or 9.
    pub fn for_point_count(count: usize) -> Result<Self> {
        match count {
            5 => Ok(Self::five_point()),
            9 => Ok(Self::nine_point()),
            _ => invalid("calibration points must be 5 (default) or 9"),
        }
    }

    /// A user supplied layout. Needs at least three rows of exactly two
    /// finite numbers; the first row is taken as the centre target.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        if rows.len() < 3 {
            return invalid("calibration targets must have at least 3 rows");
        }
        rows.iter()
            .map(|row| match row.as_ref() {
                [x, y] if x.is_finite() && y.is_finite() => Ok(Point::new(*x, *y)),
                [_, _] => invalid("all elements in calibration targets must be numeric"),
                _ => invalid("all rows in calibration targets must have 2 items"),
            })
            .collect::<Result<Vec<_>>>()
            .map(CalibrationTargets)
    }

    /// The point every pass starts and ends on.
    pub fn centre(&self) -> Point {
        self.0[0]
    }

    #[allow(missing_docs)]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Centre, every other target in a random order, then centre again.
    /// Always `len() + 1` long.
    pub fn presentation_order<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Point> {
        let mut periphery = self.0[1..].to_vec();
        periphery.shuffle(rng);

        let mut order = Vec::with_capacity(self.0.len() + 1);
        order.push(self.centre());
        order.extend(periphery);
        order.push(self.centre());
        order
    }
}

fn parse_pair(s: &str) -> IResult<&str, (f64, f64)> {
    separated_pair(double, delimited(space0, char(','), space0), double)(s)
}

fn parse_pairs(s: &str) -> IResult<&str, Vec<(f64, f64)>> {
    all_consuming(delimited(
        multispace0,
        separated_list1(multispace1, parse_pair),
        multispace0,
    ))(s)
}

/// Parses a whitespace separated list of `x,y` pairs, e.g.
/// `"0,0 -10.437,0 0,5.916 10.437,0 0,-5.916"`.
impl FromStr for CalibrationTargets {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        let (_, pairs) = parse_pairs(s).finish().map_err(|e| {
            TrackerError::InvalidConfig(format!("can not parse calibration targets at {:?}", e.input))
        })?;
        let rows: Vec<[f64; 2]> = pairs.into_iter().map(|(x, y)| [x, y]).collect();
        Self::from_rows(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_point_order_starts_and_ends_at_centre() {
        let targets = CalibrationTargets::five_point();
        let mut rng = thread_rng();
        for _ in 0..50 {
            let order = targets.presentation_order(&mut rng);
            assert_eq!(order.len(), 6);
            assert_eq!(order[0], Point::ORIGIN);
            assert_eq!(order[5], Point::ORIGIN);
            assert!(order[1..5].iter().all(|p| *p != Point::ORIGIN));
        }
    }

    #[test]
    fn shuffled_periphery_is_a_permutation() {
        let targets = CalibrationTargets::nine_point();
        let mut rng = StdRng::seed_from_u64(7);
        let order = targets.presentation_order(&mut rng);
        assert_eq!(order.len(), 10);

        let mut middle: Vec<(i64, i64)> = order[1..9]
            .iter()
            .map(|p| (p.x as i64, p.y as i64))
            .collect();
        let mut expected: Vec<(i64, i64)> = targets.points()[1..]
            .iter()
            .map(|p| (p.x as i64, p.y as i64))
            .collect();
        middle.sort();
        expected.sort();
        assert_eq!(middle, expected);
    }

    #[test]
    fn only_five_or_nine_built_in() {
        assert_eq!(CalibrationTargets::for_point_count(5).unwrap().len(), 5);
        assert_eq!(CalibrationTargets::for_point_count(9).unwrap().len(), 9);
        assert!(CalibrationTargets::for_point_count(7).is_err());
    }

    #[test]
    fn custom_rows_are_validated() {
        assert!(CalibrationTargets::from_rows(&[[0.0, 0.0], [1.0, 0.0]]).is_err());
        assert!(CalibrationTargets::from_rows(&[vec![0.0, 0.0], vec![1.0], vec![2.0, 2.0]]).is_err());
        assert!(
            CalibrationTargets::from_rows(&[[0.0, 0.0], [f64::NAN, 0.0], [2.0, 2.0]]).is_err()
        );
        let targets =
            CalibrationTargets::from_rows(&[[0.0, 0.0], [-10.437, 0.0], [0.0, 5.916]]).unwrap();
        assert_eq!(targets.presentation_order(&mut thread_rng()).len(), 4);
    }

    #[test]
    fn parses_target_lists() {
        let targets: CalibrationTargets = " 0,0 -10.437,0\n0, 5.916 10.437 ,0 ".parse().unwrap();
        assert_eq!(targets.len(), 4);
        assert_eq!(targets.points()[1], Point::new(-10.437, 0.0));

        assert!("0,0 1,1".parse::<CalibrationTargets>().is_err());
        assert!("0,0 1,1 2,x".parse::<CalibrationTargets>().is_err());
    }
}
