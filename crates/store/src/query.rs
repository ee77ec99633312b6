use common::{OrderStatus, StudentId};

use crate::Order;

/// Builder for order queries.
///
/// Results are ordered by creation time, oldest first unless
/// [`OrderQuery::newest_first`] is set.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Filter by owning student.
    pub student_id: Option<StudentId>,

    /// Filter by status (any of these).
    pub statuses: Option<Vec<OrderStatus>>,

    /// Return the most recently created orders first.
    pub newest_first: bool,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,
}

impl OrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one student's orders.
    pub fn for_student(student_id: StudentId) -> Self {
        Self {
            student_id: Some(student_id),
            ..Default::default()
        }
    }

    pub fn statuses(mut self, statuses: impl IntoIterator<Item = OrderStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if the order passes the student and status filters.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(student_id) = self.student_id
            && order.student_id != student_id
        {
            return false;
        }
        if let Some(ref statuses) = self.statuses
            && !statuses.contains(&order.status)
        {
            return false;
        }
        true
    }
}
