//! Property-based testing strategies for typing trees.
//!
//! Models are drawn over the fixed variables `hh_size` and `rooms` (numeric)
//! and `region` (categorical, three levels), with classes `poor`, `vulnerable`
//! and `better_off`, so that models of different strata always merge.
//!
//! # Examples
//!
//! ```rust,ignore
//! use typing_test::strategies::*;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn test_something(model in arb_cart_model()) {
//!         // Your test here
//!     }
//! }
//! ```
use proptest::prelude::*;
use typing_tree::{CartModel, NodeRecord, Respondent, Stratum, Variable};

pub const VARIABLES: [&str; 3] = ["hh_size", "region", "rooms"];
pub const REGIONS: [&str; 3] = ["north", "south", "east"];
pub const CLASSES: [&str; 3] = ["poor", "vulnerable", "better_off"];

/// Category rows routing every level, each with both sides non-empty.
const ROUTINGS: [[u8; 3]; 6] = [[1, 3, 3], [1, 1, 3], [3, 1, 1], [1, 3, 1], [3, 3, 1], [3, 1, 3]];

const MAX_DEPTH: u32 = 3;

/// Largest numeric answer drawn by [`arb_respondent`].
const MAX_ANSWER: u32 = 11;

/// Drawn parameters of one tree position.
type Position = (bool, usize, u32, usize, usize);

fn arb_position() -> impl Strategy<Value = Position> {
    (
        prop::bool::ANY,
        0usize..VARIABLES.len(),
        0u32..10,
        0usize..ROUTINGS.len(),
        1usize..=CLASSES.len(),
    )
}

/// Answers still reaching a node: an inclusive integer range per numeric
/// variable and a bitmask of regions.
#[derive(Debug, Clone, Copy)]
struct Reach {
    hh_size: (u32, u32),
    rooms: (u32, u32),
    regions: u8,
}

impl Reach {
    fn new() -> Self {
        Self {
            hh_size: (0, MAX_ANSWER),
            rooms: (0, MAX_ANSWER),
            regions: (1 << REGIONS.len()) - 1,
        }
    }

    fn range(&mut self, var: usize) -> &mut (u32, u32) {
        if VARIABLES[var] == "hh_size" { &mut self.hh_size } else { &mut self.rooms }
    }

    fn splittable(&self, var: usize) -> bool {
        match VARIABLES[var] {
            "region" => self.regions.count_ones() > 1,
            "hh_size" => self.hh_size.0 < self.hh_size.1,
            _ => self.rooms.0 < self.rooms.1,
        }
    }
}

/// Category row splitting the regions still reaching a node into two
/// non-empty sides. Regions that cannot reach it are coded absent.
fn region_row(routing: usize, regions: u8) -> Vec<u8> {
    let mut row = (0..REGIONS.len())
        .map(|level| {
            if regions & (1 << level) == 0 {
                2
            } else {
                ROUTINGS[routing][level]
            }
        })
        .collect::<Vec<_>>();
    let reaching = (0..REGIONS.len()).filter(|level| regions & (1 << level) != 0).collect::<Vec<_>>();
    if reaching.iter().all(|level| row[*level] == row[reaching[0]]) {
        row[reaching[0]] = 4 - row[reaching[0]];
    }
    row
}

/// Strategy for generating complete `rpart` models up to depth three.
///
/// The root always splits. A path may split the same variable again, within
/// the answers that still reach the node, as `rpart` does. Numeric thresholds
/// are half-integers so that integer answers never sit on a boundary.
pub fn arb_cart_model() -> impl Strategy<Value = CartModel> {
    prop::collection::vec(arb_position(), 1usize << (MAX_DEPTH + 1)).prop_map(|positions| {
        let mut nodes = Vec::new();
        let mut csplit = Vec::new();
        let mut stack = vec![(1u64, 0u32, Reach::new())];

        while let Some((id, depth, mut reach)) = stack.pop() {
            let (split, var, threshold, routing, yval) = positions[id as usize % positions.len()];
            let var = (0..VARIABLES.len())
                .map(|offset| (var + offset) % VARIABLES.len())
                .find(|candidate| reach.splittable(*candidate));
            let Some(var) = var.filter(|_| (split || id == 1) && depth < MAX_DEPTH) else {
                nodes.push(NodeRecord::leaf(id, yval));
                continue;
            };

            let (mut left, mut right) = (reach, reach);
            if VARIABLES[var] == "region" {
                let row = region_row(routing, reach.regions);
                for (level, code) in row.iter().enumerate() {
                    match code {
                        1 => right.regions &= !(1 << level),
                        3 => left.regions &= !(1 << level),
                        _ => {}
                    }
                }
                csplit.push(row);
                nodes.push(NodeRecord::split(id, var, 3, csplit.len() as f64, yval));
            } else {
                let (lo, hi) = *reach.range(var);
                let cut = lo + threshold % (hi - lo);
                left.range(var).1 = cut;
                right.range(var).0 = cut + 1;
                nodes.push(NodeRecord::split(id, var, -1, cut as f64 + 0.5, yval));
            }
            stack.push((id * 2 + 1, depth + 1, right));
            stack.push((id * 2, depth + 1, left));
        }

        CartModel {
            nodes,
            ylevels: CLASSES.iter().map(|class| (*class).into()).collect(),
            xlevels: VARIABLES
                .iter()
                .map(|name| Variable {
                    name: (*name).into(),
                    levels: if *name == "region" {
                        REGIONS.iter().map(|level| (*level).into()).collect()
                    } else {
                        Vec::new()
                    },
                })
                .collect(),
            csplit,
        }
    })
}

/// Strategy for generating a rural and an urban model.
pub fn arb_stratified_models() -> impl Strategy<Value = Vec<(Stratum, CartModel)>> {
    (arb_cart_model(), arb_cart_model())
        .prop_map(|(rural, urban)| vec![(Stratum::rural(), rural), (Stratum::urban(), urban)])
}

/// Strategy for generating a respondent answering every variable.
pub fn arb_respondent() -> impl Strategy<Value = Respondent> {
    (
        prop::sample::select(vec![Stratum::rural(), Stratum::urban()]),
        0..=MAX_ANSWER,
        0..=MAX_ANSWER,
        prop::sample::select(REGIONS.to_vec()),
    )
        .prop_map(|(stratum, hh_size, rooms, region)| {
            Respondent::new(stratum)
                .with_number("hh_size", hh_size as f64)
                .with_number("rooms", rooms as f64)
                .with_choice("region", region)
        })
}

/// Configuration tables covering every model drawn by [`arb_cart_model`].
pub fn config_tables() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "questions",
            "name,type,label::English (en)\n\
             hh_size,integer,Household size\n\
             region,select_one region,Region\n\
             rooms,integer,Rooms\n",
        ),
        ("choices", "list_name,name,label::English (en)\nregion,north,North\nregion,south,South\nregion,east,East\n"),
        ("segments", "name,label::English (en)\npoor,Poor\nvulnerable,Vulnerable\nbetter_off,Better off\n"),
    ]
}
