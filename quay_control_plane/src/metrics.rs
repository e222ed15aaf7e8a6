use quay_observability::Counter;

#[derive(Debug)]
pub struct ResourceManagerMetrics {
    pub refreshes: Counter<u64>,
    pub refresh_failures: Counter<u64>,
    pub invalidations: Counter<u64>,
}

impl Default for ResourceManagerMetrics {
    fn default() -> Self {
        let meter = quay_observability::meter("resource_manager");

        Self {
            refreshes: meter
                .u64_counter("resource_manager.refresh.count")
                .with_description("the number of successful resource discoveries")
                .build(),
            refresh_failures: meter
                .u64_counter("resource_manager.refresh.failure.count")
                .with_description("the number of failed resource discoveries")
                .build(),
            invalidations: meter
                .u64_counter("resource_manager.invalidation.count")
                .with_description("the number of times cached resources were dropped")
                .build(),
        }
    }
}
