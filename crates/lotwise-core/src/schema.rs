/// Arrow schemas and record-batch builders for bulk export.
///
/// Estimates go to bulk consumers; feature batches go to the training side,
/// which must see exactly the slot order the scorers were built against.
pub mod export {
    use std::sync::Arc;

    use arrow::array::{
        ArrayRef, BooleanBuilder, FixedSizeListBuilder, Float32Array, Float32Builder,
        Float64Array, Int64Array, StringArray, TimestampNanosecondArray,
    };
    use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
    use arrow::record_batch::RecordBatch;
    use chrono::{DateTime, Utc};

    use crate::error::CoreError;
    use crate::estimate::PriceEstimate;
    use crate::features::{FeatureSchema, FeatureVector};
    use crate::isbn::Isbn13;

    fn utc_nanos() -> DataType {
        DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into()))
    }

    /// One row per routed estimate.
    pub fn estimates_schema() -> Schema {
        Schema::new(vec![
            Field::new("isbn", DataType::Utf8, false),
            Field::new("value_cents", DataType::Int64, false),
            Field::new("value", DataType::Float64, false),
            Field::new("tier", DataType::Utf8, false),
            Field::new("platform", DataType::Utf8, true),
            Field::new("model", DataType::Utf8, false),
            Field::new("confidence", DataType::Utf8, false),
            Field::new("scored_at", utc_nanos(), false),
        ])
    }

    pub fn estimates_to_batch(
        rows: &[(Isbn13, PriceEstimate)],
        scored_at: DateTime<Utc>,
    ) -> Result<RecordBatch, CoreError> {
        let nanos = scored_at.timestamp_nanos_opt().unwrap_or_default();
        let n = rows.len();
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|(isbn, _)| isbn.as_str()),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|(_, e)| e.value.cents()),
            )),
            Arc::new(Float64Array::from_iter_values(
                rows.iter().map(|(_, e)| e.value.dollars()),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|(_, e)| e.source.tier.as_str()),
            )),
            Arc::new(StringArray::from(
                rows.iter()
                    .map(|(_, e)| e.source.platform.as_ref().map(|p| p.as_str()))
                    .collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|(_, e)| e.source.model.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|(_, e)| e.confidence.as_str()),
            )),
            Arc::new(TimestampNanosecondArray::from(vec![nanos; n]).with_timezone("UTC")),
        ];
        Ok(RecordBatch::try_new(Arc::new(estimates_schema()), columns)?)
    }

    /// One row per assembled vector; `features` and `sentinel` are fixed-size
    /// lists whose width is the schema's slot count.
    pub fn features_schema(schema: &FeatureSchema) -> Schema {
        let width = schema.len() as i32;
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("feature_schema".to_string(), schema.version().to_string());
        metadata.insert("slots".to_string(), schema.slots().join(","));
        Schema::new(vec![
            Field::new("isbn", DataType::Utf8, false),
            Field::new(
                "features",
                DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), width),
                false,
            ),
            Field::new(
                "sentinel",
                DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Boolean, true)), width),
                false,
            ),
            Field::new("completeness", DataType::Float32, false),
        ])
        .with_metadata(metadata)
    }

    pub fn features_to_batch(
        schema: &FeatureSchema,
        rows: &[(Isbn13, FeatureVector)],
    ) -> Result<RecordBatch, CoreError> {
        let width = schema.len() as i32;
        let mut features = FixedSizeListBuilder::new(Float32Builder::new(), width);
        let mut sentinel = FixedSizeListBuilder::new(BooleanBuilder::new(), width);

        for (_, fv) in rows {
            fv.check(schema)?;
            features.values().append_slice(fv.values());
            features.append(true);
            for slot in schema.slots() {
                sentinel.values().append_value(fv.is_sentinel(slot));
            }
            sentinel.append(true);
        }

        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|(isbn, _)| isbn.as_str()),
            )),
            Arc::new(features.finish()),
            Arc::new(sentinel.finish()),
            Arc::new(Float32Array::from_iter_values(
                rows.iter().map(|(_, fv)| fv.completeness()),
            )),
        ];
        Ok(RecordBatch::try_new(
            Arc::new(features_schema(schema)),
            columns,
        )?)
    }
}
