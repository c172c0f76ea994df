use interchange_model::GtfsTime;

/// What one schedule row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RowType {
    #[default]
    Revenue,
    PullOut,
    PullIn,
    Deadhead,
    Break,
    Relief,
    Layover,
}

impl RowType {
    pub fn parse(value: &str) -> Option<RowType> {
        let folded: String = value
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric())
            .collect();
        match folded.as_str() {
            "revenue" | "service" | "trip" | "inservice" => Some(RowType::Revenue),
            "pullout" | "depotout" => Some(RowType::PullOut),
            "pullin" | "depotin" => Some(RowType::PullIn),
            "deadhead" | "deadrun" | "dh" => Some(RowType::Deadhead),
            "break" | "meal" | "mealbreak" => Some(RowType::Break),
            "relief" => Some(RowType::Relief),
            "layover" => Some(RowType::Layover),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RowType::Revenue => "revenue",
            RowType::PullOut => "pull_out",
            RowType::PullIn => "pull_in",
            RowType::Deadhead => "deadhead",
            RowType::Break => "break",
            RowType::Relief => "relief",
            RowType::Layover => "layover",
        }
    }

    /// Rows that count toward continuous driving time.
    pub fn is_driving(&self) -> bool {
        matches!(
            self,
            RowType::Revenue | RowType::PullOut | RowType::PullIn | RowType::Deadhead
        )
    }
}

/// One row of a run-cut: a piece of work assigned to a block and duty.
#[derive(Debug, Clone, Default)]
pub struct ScheduleRow {
    pub run_number: Option<String>,
    pub block: Option<String>,
    pub trip_id: Option<String>,
    pub start_place: Option<String>,
    pub end_place: Option<String>,
    pub start_time: Option<GtfsTime>,
    pub end_time: Option<GtfsTime>,
    pub depot: Option<String>,
    pub vehicle_class: Option<String>,
    pub vehicle_type: Option<String>,
    pub start_lat: Option<f64>,
    pub start_lon: Option<f64>,
    pub end_lat: Option<f64>,
    pub end_lon: Option<f64>,
    pub route_shape_id: Option<String>,
    pub duty_id: Option<String>,
    pub shift_id: Option<String>,
    pub row_type: RowType,
}

impl ScheduleRow {
    /// Duty grouping key: explicit duty, else the driver run.
    pub fn duty_key(&self) -> Option<&str> {
        self.duty_id
            .as_deref()
            .or(self.run_number.as_deref())
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub rows: Vec<ScheduleRow>,
}

impl Schedule {
    pub fn new(rows: Vec<ScheduleRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row indices grouped by block in first-seen order, each group sorted
    /// by start time (stable for ties). Rows without a block group under "".
    pub fn blocks(&self) -> Vec<(String, Vec<usize>)> {
        self.group_by(|row| row.block.clone().unwrap_or_default())
    }

    /// Row indices grouped by duty key, sorted by start time within a duty.
    pub fn duties(&self) -> Vec<(String, Vec<usize>)> {
        self.group_by(|row| row.duty_key().unwrap_or_default().to_string())
    }

    fn group_by(&self, key: impl Fn(&ScheduleRow) -> String) -> Vec<(String, Vec<usize>)> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: std::collections::HashMap<String, Vec<usize>> =
            std::collections::HashMap::new();
        for (index, row) in self.rows.iter().enumerate() {
            let group_key = key(row);
            if !groups.contains_key(&group_key) {
                order.push(group_key.clone());
            }
            groups.entry(group_key).or_default().push(index);
        }
        order
            .into_iter()
            .map(|group_key| {
                let mut indexes = groups.remove(&group_key).unwrap_or_default();
                indexes.sort_by_key(|&index| {
                    self.rows[index]
                        .start_time
                        .map(|time| time.total_seconds())
                        .unwrap_or(i32::MAX)
                });
                (group_key, indexes)
            })
            .collect()
    }
}
