use crate::{
    config::SyncConfig,
    synchronizer::Synchronizer,
    types::{MatchedTriplet, StreamKind, TripletStream, WithTimestamp},
};
use eyre::Result;
use futures::{
    StreamExt,
    stream::{self, Stream},
};
use std::{
    pin::Pin,
    task::{Context, Poll, Poll::*},
};

/// Consume a stream of messages, each tagged with its stream kind, and
/// group them into color/depth/calibration triplets.
///
/// Matching follows the same rules as a [Synchronizer]. Late messages
/// are skipped. The output ends when the input ends.
pub fn sync<'a, T, S>(stream: S, config: SyncConfig) -> Result<TripletStream<'a, T>>
where
    T: WithTimestamp + 'a,
    S: Stream<Item = (StreamKind, T)> + Unpin + Send + 'a,
{
    let mut synchronizer = Synchronizer::new(config)?;

    let output_stream = {
        let mut stream = Some(stream);
        stream::poll_fn(move |ctx| poll(Pin::new(&mut stream), &mut synchronizer, ctx))
    };

    Ok(output_stream.boxed())
}

fn poll<T, S>(
    mut input_stream: Pin<&mut Option<S>>,
    synchronizer: &mut Synchronizer<T>,
    ctx: &mut Context<'_>,
) -> Poll<Option<MatchedTriplet<T>>>
where
    T: WithTimestamp,
    S: Stream<Item = (StreamKind, T)> + Unpin,
{
    let Some(mut input_stream_mut) = input_stream.as_mut().as_pin_mut() else {
        return Ready(None);
    };

    loop {
        match input_stream_mut.as_mut().poll_next(ctx) {
            Ready(Some((kind, item))) => {
                if let Some(triplet) = synchronizer.ingest(kind, item) {
                    return Ready(Some(triplet));
                }
            }
            Ready(None) => {
                input_stream.set(None);
                return Ready(None);
            }
            Pending => return Pending,
        }
    }
}
