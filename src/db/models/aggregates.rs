/// Average price of one token inside one time bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketedPrice {
    pub token_address: String,
    /// Bucket start, milliseconds since the unix epoch.
    pub bucket_start_ms: i64,
    /// Earliest raw timestamp that fell into the bucket.
    pub first_timestamp_ms: i64,
    pub price: f64,
}

/// Price statistics of one token over a trailing window.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPriceStats {
    pub token_address: String,
    pub average_price: f64,
    pub high: f64,
    pub low: f64,
}
