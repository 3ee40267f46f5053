pub mod row_sm;
