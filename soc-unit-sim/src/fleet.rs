/*!
Composition de la flotte simulée

Répartit les ids configurés en actives / hors bornes / inactives / muettes
selon les pourcentages de la ligne de commande, puis tire les valeurs de chaque unité.
*/

use rand::Rng;
use soc_aggregator::{SocBounds, UnitReply};

/// Capacités (kWh) qu'une unité simulée peut annoncer
pub const CAPACITIES: [f64; 3] = [1000.0, 2000.0, 3000.0];

#[derive(Debug, Clone, Copy)]
pub struct FleetPercentages {
    pub active: f64,
    pub oob: f64,
    pub nonresponding: f64,
}

#[derive(Debug, Clone, Default)]
pub struct FleetPlan {
    /// Unités qui répondent à chaque requête, avec leur réponse
    pub responders: Vec<UnitReply>,
    pub out_of_bounds: Vec<String>,
    /// Unités inactives qui ne répondent jamais
    pub silent: Vec<String>,
}

fn share(len: usize, percent: f64) -> usize {
    ((len as f64 * percent / 100.0).round() as usize).min(len)
}

fn capacity<R: Rng>(rng: &mut R) -> f64 {
    CAPACITIES[rng.gen_range(0..CAPACITIES.len())]
}

/// SoC strictement hors `bounds` : sous le minimum ou au-dessus du maximum
fn out_of_bounds_soc<R: Rng>(bounds: SocBounds, rng: &mut R) -> f64 {
    let span = bounds.minimum + 1.0 - bounds.maximum;
    if span <= 0.0 {
        return bounds.maximum + 0.1;
    }
    let soc = rng.gen_range(0.0..span);
    if soc > bounds.minimum {
        soc + bounds.maximum - bounds.minimum
    } else {
        soc
    }
}

pub fn plan_fleet<R: Rng>(
    unit_ids: &[String],
    bounds: SocBounds,
    pct: FleetPercentages,
    rng: &mut R,
) -> FleetPlan {
    let (active, inactive) = unit_ids.split_at(share(unit_ids.len(), pct.active));
    let out_of_bounds = &active[..share(active.len(), pct.oob)];
    let responding_inactive = share(inactive.len(), 100.0 - pct.nonresponding);

    let mut plan = FleetPlan {
        out_of_bounds: out_of_bounds.to_vec(),
        silent: inactive[responding_inactive..].to_vec(),
        ..FleetPlan::default()
    };

    for (i, unit_id) in active.iter().enumerate() {
        let soc = if i < out_of_bounds.len() {
            out_of_bounds_soc(bounds, rng)
        } else {
            rng.gen_range(bounds.minimum..=bounds.maximum)
        };
        plan.responders.push(UnitReply {
            unit_id: unit_id.clone(),
            active: true,
            soc,
            total_capacity: capacity(rng),
        });
    }

    for unit_id in &inactive[..responding_inactive] {
        plan.responders.push(UnitReply {
            unit_id: unit_id.clone(),
            active: false,
            soc: 0.0,
            total_capacity: capacity(rng),
        });
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const BOUNDS: SocBounds = SocBounds { minimum: 0.2, maximum: 0.9 };

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("unit{i:02}")).collect()
    }

    #[test]
    fn test_default_percentages_make_everyone_active() {
        let mut rng = StdRng::seed_from_u64(7);
        let pct = FleetPercentages { active: 100.0, oob: 0.0, nonresponding: 0.0 };
        let plan = plan_fleet(&ids(5), BOUNDS, pct, &mut rng);

        assert_eq!(plan.responders.len(), 5);
        assert!(plan.silent.is_empty());
        assert!(plan.out_of_bounds.is_empty());
        for reply in &plan.responders {
            assert!(reply.active);
            assert!(BOUNDS.contains(reply.soc), "{} out of bounds", reply.soc);
            assert!(CAPACITIES.contains(&reply.total_capacity));
        }
    }

    #[test]
    fn test_split_by_percentages() {
        let mut rng = StdRng::seed_from_u64(42);
        let pct = FleetPercentages { active: 60.0, oob: 50.0, nonresponding: 50.0 };
        let plan = plan_fleet(&ids(10), BOUNDS, pct, &mut rng);

        // 6 actifs dont 3 hors bornes ; 4 inactifs dont 2 muets
        let active: Vec<_> = plan.responders.iter().filter(|r| r.active).collect();
        assert_eq!(active.len(), 6);
        assert_eq!(plan.out_of_bounds, vec!["unit00", "unit01", "unit02"]);
        assert_eq!(plan.silent, vec!["unit08", "unit09"]);
        assert_eq!(plan.responders.len(), 8);

        for reply in &active {
            let expected_oob = plan.out_of_bounds.contains(&reply.unit_id);
            assert_eq!(
                !BOUNDS.contains(reply.soc),
                expected_oob,
                "{}: {}",
                reply.unit_id,
                reply.soc
            );
        }
        for reply in plan.responders.iter().filter(|r| !r.active) {
            assert_eq!(reply.soc, 0.0);
        }
    }

    #[test]
    fn test_out_of_bounds_soc_stays_in_unit_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let soc = out_of_bounds_soc(BOUNDS, &mut rng);
            assert!((0.0..1.0).contains(&soc));
            assert!(!(0.2..=0.9).contains(&soc));
        }
    }
}
