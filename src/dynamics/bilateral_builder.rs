//! Bilateral rows: one scalar equality per row, appended after the contacts.

use crate::{
    config::{SolverSettings, BILATERAL_NONZEROS},
    core::constraints::BilateralRow,
    dynamics::Entry,
    error::{SolverError, SolverResult},
    utils::{math::Real, sparse::for_each_block},
};

/// Builder for the bilateral family of constraints.
#[derive(Debug, Clone, Copy, Default)]
pub struct BilateralBuilder;

impl BilateralBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Rejects rows referencing bodies outside `0..num_bodies`.
    pub fn validate(&self, rows: &[BilateralRow], num_bodies: usize) -> SolverResult<()> {
        for (index, row) in rows.iter().enumerate() {
            for body in [row.body_a, row.body_b] {
                if body >= num_bodies {
                    return Err(SolverError::InvalidBodyIndex {
                        kind: "bilateral",
                        index,
                        body,
                        num_bodies,
                    });
                }
            }
        }
        Ok(())
    }

    /// Fills `entries` (pre-sized to twelve per row); row `i` lands at
    /// `row_offset + i`.
    pub fn build_d(&self, rows: &[BilateralRow], row_offset: usize, entries: &mut [Entry]) {
        for_each_block(entries, BILATERAL_NONZEROS, |index, block: &mut [Entry]| {
            let bilateral = &rows[index];
            let row = row_offset + index;
            let (col_a, col_b) = (6 * bilateral.body_a, 6 * bilateral.body_b);
            for k in 0..6 {
                block[k] = Entry::new(row, col_a + k, bilateral.jacobian_a[k]);
                block[6 + k] = Entry::new(row, col_b + k, bilateral.jacobian_b[k]);
            }
        });
    }

    pub fn build_e(&self, rows: &[BilateralRow], settings: &SolverSettings, e: &mut [Real]) {
        let h = settings.step_size;
        let inv_hhpa = 1.0 / (h * (h + settings.alpha));
        for (value, row) in e.iter_mut().zip(rows) {
            *value = inv_hhpa * row.compliance;
        }
    }

    pub fn build_b(&self, rows: &[BilateralRow], settings: &SolverSettings, b: &mut [Real]) {
        let h = settings.step_size;
        let inv_h = if settings.alpha > 0.0 {
            1.0 / (h + settings.alpha)
        } else {
            1.0 / h
        };
        for (value, row) in b.iter_mut().zip(rows) {
            *value = inv_h * row.violation;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn row(body_a: usize, body_b: usize) -> BilateralRow {
        BilateralRow {
            body_a,
            body_b,
            jacobian_a: [-1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            jacobian_b: [1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            violation: 0.02,
            compliance: 1e-4,
        }
    }

    #[test]
    fn rows_are_offset_past_the_contacts() {
        let rows = [row(0, 1), row(1, 2)];
        let mut entries = vec![Entry::default(); 2 * BILATERAL_NONZEROS];
        BilateralBuilder.build_d(&rows, 3, &mut entries);
        assert_eq!(entries[0], Entry::new(3, 0, -1.0));
        assert_eq!(entries[6], Entry::new(3, 6, 1.0));
        assert_eq!(entries[12], Entry::new(4, 6, -1.0));
        assert_eq!(entries[18], Entry::new(4, 12, 1.0));
    }

    #[test]
    fn bias_and_compliance_scale_with_step_size() {
        let settings = SolverSettings {
            step_size: 0.01,
            ..SolverSettings::default()
        };
        let rows = [row(0, 1)];
        let (mut b, mut e) = ([0.0], [0.0]);
        BilateralBuilder.build_b(&rows, &settings, &mut b);
        BilateralBuilder.build_e(&rows, &settings, &mut e);
        assert_relative_eq!(b[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(e[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn validate_reports_offending_row() {
        let err = BilateralBuilder
            .validate(&[row(0, 1), row(0, 4)], 3)
            .unwrap_err();
        assert_eq!(
            err,
            SolverError::InvalidBodyIndex {
                kind: "bilateral",
                index: 1,
                body: 4,
                num_bodies: 3
            }
        );
    }
}
