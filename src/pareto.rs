// PARSIMONY PARETO REDUCER
// NON-DOMINATED SUBSET UNDER POLARITY-TAGGED OBJECTIVES
//
// O(N^2) PAIRWISE SCAN. FINE FOR THE HUNDREDS OF CANDIDATES THE
// GENERATOR PRODUCES. IDENTICAL OBJECTIVE VECTORS COLLAPSE TO THE
// FIRST-SEEN REPRESENTATIVE SO THE RESULT IS DETERMINISTIC.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Min,
    Max,
}

pub struct Objective<T> {
    pub value: fn(&T) -> f64,
    pub polarity: Polarity,
}

// SCORE WHERE BIGGER IS ALWAYS BETTER
fn scores<T>(item: &T, objectives: &[Objective<T>]) -> Vec<f64> {
    objectives
        .iter()
        .map(|o| match o.polarity {
            Polarity::Max => (o.value)(item),
            Polarity::Min => -(o.value)(item),
        })
        .collect()
}

// a DOMINATES b: NO WORSE EVERYWHERE, STRICTLY BETTER SOMEWHERE
fn dominates(a: &[f64], b: &[f64]) -> bool {
    let mut strictly = false;
    for (x, y) in a.iter().zip(b.iter()) {
        if x < y {
            return false;
        }
        if x > y {
            strictly = true;
        }
    }
    strictly
}

pub fn pareto_front<T: Clone>(items: &[T], objectives: &[Objective<T>]) -> Vec<T> {
    let all: Vec<Vec<f64>> = items.iter().map(|i| scores(i, objectives)).collect();

    let mut front = Vec::new();
    for (i, si) in all.iter().enumerate() {
        let mut keep = true;
        for (j, sj) in all.iter().enumerate() {
            if i == j {
                continue;
            }
            if dominates(sj, si) {
                keep = false;
                break;
            }
            // TIE: EARLIER TWIN ALREADY REPRESENTS THIS VECTOR
            if j < i && sj == si {
                keep = false;
                break;
            }
        }
        if keep {
            front.push(items[i].clone());
        }
    }
    front
}
