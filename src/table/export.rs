//! Arrow export of a result table
//!
//! Column types follow the data: integer parameters and counters become
//! `Int64`, anything mixing integers and floats becomes `Float64`, labels
//! become `Utf8`. Metric, error cells are nullable.

use super::ResultTable;
use crate::extract::MetricValue;
use crate::space::Value;
use crate::Result;
use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

impl ResultTable {
    /// Export all rows as one Arrow [`RecordBatch`]: parameter columns,
    /// metric columns, then `status` and `error`.
    ///
    /// # Errors
    ///
    /// Returns an Arrow error if the batch cannot be assembled, or if a
    /// parameter or metric shares its name with another column.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let rows = self.rows();
        let metric_names = self.metric_names();
        let mut fields: Vec<Field> = Vec::new();
        let mut columns: Vec<ArrayRef> = Vec::new();

        for (i, name) in self.names.iter().enumerate() {
            let cells: Vec<&Value> = rows.iter().map(|r| &r.values[i]).collect();
            let (data_type, column) = param_column(&cells);
            fields.push(Field::new(name, data_type, false));
            columns.push(column);
        }

        for (i, name) in metric_names.iter().enumerate() {
            let cells: Vec<Option<MetricValue>> = rows.iter().map(|r| r.metrics[i]).collect();
            let (data_type, column) = metric_column(&cells);
            fields.push(Field::new(name, data_type, true));
            columns.push(column);
        }

        fields.push(Field::new("status", DataType::Utf8, false));
        columns.push(Arc::new(StringArray::from(
            rows.iter().map(|r| r.status).collect::<Vec<_>>(),
        )));
        fields.push(Field::new("error", DataType::Utf8, true));
        columns.push(Arc::new(StringArray::from(
            rows.iter().map(|r| r.error.clone()).collect::<Vec<_>>(),
        )));

        let schema = Arc::new(Schema::new(fields));
        Ok(RecordBatch::try_new(schema, columns)?)
    }
}

fn param_column(cells: &[&Value]) -> (DataType, ArrayRef) {
    if cells.iter().all(|v| matches!(v, Value::Int(_))) {
        let values: Vec<i64> = cells
            .iter()
            .filter_map(|v| match v {
                Value::Int(i) => Some(*i),
                _ => None,
            })
            .collect();
        return (DataType::Int64, Arc::new(Int64Array::from(values)));
    }
    if cells.iter().all(|v| v.as_f64().is_some()) {
        let values: Vec<f64> = cells.iter().filter_map(|v| v.as_f64()).collect();
        return (DataType::Float64, Arc::new(Float64Array::from(values)));
    }
    let values: Vec<String> = cells.iter().map(ToString::to_string).collect();
    (DataType::Utf8, Arc::new(StringArray::from(values)))
}

fn metric_column(cells: &[Option<MetricValue>]) -> (DataType, ArrayRef) {
    let all_int = cells
        .iter()
        .flatten()
        .all(|v| matches!(v, MetricValue::Int(_)));
    if all_int {
        let values: Vec<Option<i64>> = cells
            .iter()
            .map(|cell| match cell {
                Some(MetricValue::Int(i)) => Some(*i),
                _ => None,
            })
            .collect();
        (DataType::Int64, Arc::new(Int64Array::from(values)))
    } else {
        let values: Vec<Option<f64>> = cells.iter().map(|c| c.map(MetricValue::as_f64)).collect();
        (DataType::Float64, Arc::new(Float64Array::from(values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Metrics;
    use crate::space::ConfigSpace;
    use crate::sweep::{Failure, Outcome};
    use arrow::array::Array;

    #[test]
    fn test_record_batch_columns() {
        let space = ConfigSpace::builder()
            .param("llc", [1024, 2048])
            .param("trace", ["gcc"])
            .build()
            .unwrap();
        let outcomes = [
            Outcome::Success(
                Metrics::new()
                    .with("access", MetricValue::Int(100))
                    .with("miss_rate", MetricValue::Float(0.25)),
            ),
            Outcome::Failure(Failure::Cancelled),
        ];
        let table = ResultTable::from_records(&space, space.iter().zip(outcomes)).unwrap();

        let batch = table.to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 6);

        let schema = batch.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(2).name(), "access");
        assert_eq!(schema.field(2).data_type(), &DataType::Int64);
        assert_eq!(schema.field(3).data_type(), &DataType::Float64);

        let access = batch
            .column(2)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(access.value(0), 100);
        assert!(access.is_null(1));

        let status = batch
            .column(4)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(status.value(1), "cancelled");
    }
}
